//! API key authentication for stream registration.

use crate::server::AppContext;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};

/// Bearer token from an `Authorization` header, if present.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

/// Check the bearer token against the configured API key
fn check_auth(api_key: Option<&str>, bearer_token: Option<&str>) -> Result<(), (StatusCode, &'static str)> {
    let Some(api_key) = api_key else {
        return Ok(());
    };

    match bearer_token {
        Some(token) if token == api_key => Ok(()),
        _ => Err((StatusCode::UNAUTHORIZED, "Authentication required")),
    }
}

/// Middleware for API key authentication
pub async fn api_auth_middleware(
    State(ctx): State<AppContext>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    check_auth(
        ctx.config.server.api_key.as_deref(),
        bearer_token(request.headers()),
    )?;

    Ok(next.run(request).await)
}
