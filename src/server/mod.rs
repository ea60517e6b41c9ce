use crate::config::Config;
use crate::streaming::{start_cleanup_task, Engine, StreamRegistry};
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod auth;
pub mod routes_stream;

/// How often expired registry entries are swept
const REGISTRY_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Delivery engine (HTTP client, quirk tables, ffmpeg settings)
    pub engine: Arc<Engine>,
    /// Streams registered and awaiting delivery
    pub registry: StreamRegistry,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let engine = Engine::new(&config).context("Failed to build delivery engine")?;
        Ok(Self {
            registry: StreamRegistry::from_config(&config.stream),
            engine: Arc::new(engine),
            config: Arc::new(config),
        })
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        .nest("/api", routes_stream::stream_routes(&ctx))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let ctx = AppContext::new(config)?;
    let cleanup = start_cleanup_task(ctx.registry.clone(), REGISTRY_CLEANUP_INTERVAL);

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup.abort();
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn router(config: Config) -> Router {
        create_router(AppContext::new(config).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(Config::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_requires_api_key_when_configured() {
        let mut config = Config::default();
        config.server.api_key = Some("secret".to_string());
        let app = router(config);
        let body = r#"{"urls":"http://x/v.mp4","filename":"clip.mp4"}"#;

        let denied = app
            .clone()
            .oneshot(
                Request::post("/api/stream")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .oneshot(
                Request::post("/api/stream")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        let bytes = allowed.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "stream");
        assert!(json["url"].as_str().unwrap().starts_with("/api/stream/"));
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_descriptor() {
        let response = router(Config::default())
            .oneshot(
                Request::post("/api/stream")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"urls":"","filename":"clip.mp4"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_stream_is_404() {
        let app = router(Config::default());
        for path in ["/api/stream/not-a-uuid", "/api/stream/00000000-0000-4000-8000-000000000000"] {
            let response = app
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }
}
