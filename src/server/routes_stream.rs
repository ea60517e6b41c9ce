//! Stream registration and delivery routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mediaforge_common::{Error, StreamDescriptor, StreamId};
use serde::Serialize;
use tracing::Instrument;

use crate::server::{auth, AppContext};
use crate::streaming::{self, ResponseSink};

/// Response body for a registered stream
#[derive(Debug, Serialize)]
pub struct StreamCreated {
    pub status: &'static str,
    pub url: String,
}

/// Routes under `/api`
pub fn stream_routes(ctx: &AppContext) -> Router<AppContext> {
    let register = Router::new()
        .route("/stream", post(create_stream))
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::api_auth_middleware,
        ));

    register.merge(Router::new().route("/stream/:id", get(get_stream)))
}

fn error_response(status: StatusCode, error: &Error) -> Response {
    (
        status,
        Json(serde_json::json!({
            "status": "error",
            "error": error.to_string(),
        })),
    )
        .into_response()
}

/// Register a descriptor for delivery
async fn create_stream(
    State(ctx): State<AppContext>,
    Json(descriptor): Json<StreamDescriptor>,
) -> Response {
    if let Err(e) = descriptor.validate() {
        return error_response(StatusCode::BAD_REQUEST, &e);
    }

    let id = ctx.registry.register(descriptor);
    Json(StreamCreated {
        status: "stream",
        url: format!("/api/stream/{}", id),
    })
    .into_response()
}

/// Deliver a registered stream
async fn get_stream(State(ctx): State<AppContext>, Path(id): Path<String>) -> Response {
    let descriptor = id
        .parse::<StreamId>()
        .ok()
        .and_then(|id| ctx.registry.take(&id).map(|d| (id, d)));

    let Some((id, descriptor)) = descriptor else {
        return error_response(StatusCode::NOT_FOUND, &Error::not_found(id));
    };

    let (sink, response) = ResponseSink::new();
    let engine = ctx.engine.clone();
    let span = tracing::info_span!("stream", stream_id = %id);
    tokio::spawn(
        async move {
            streaming::deliver(&engine, descriptor, sink).await;
        }
        .instrument(span),
    );

    match response.await {
        Ok(response) => response,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
