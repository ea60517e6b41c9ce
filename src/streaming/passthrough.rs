//! Direct passthrough: the origin body, unchanged.

use std::sync::Arc;

use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use mediaforge_common::filename::audio_filename;
use mediaforge_common::{StreamDescriptor, Strategy};

use super::fetch::{body_stream, fetch};
use super::pipe::spawn_pipe;
use super::response::ResponseSink;
use super::session::Session;
use super::{disposition, Engine, StreamError};

/// Forward the single URL's body to the client.
///
/// Content type and length are copied from the origin. Returns once the
/// session has ended.
pub async fn passthrough(engine: &Engine, descriptor: StreamDescriptor, sink: ResponseSink) {
    let session = Session::new(sink, Strategy::Passthrough, descriptor.service.clone());
    let started = session.before_headers(start(engine, &descriptor, &session));
    if let Err(e) = started.await {
        session.shutdown(Err(e));
    }
    session.finished().await;
}

async fn start(
    engine: &Engine,
    descriptor: &StreamDescriptor,
    session: &Arc<Session>,
) -> Result<(), StreamError> {
    let url = descriptor.single_url()?;
    let filename = if descriptor.is_audio_only {
        audio_filename(&descriptor.filename, descriptor.audio_format())
    } else {
        descriptor.filename.clone()
    };

    let response = fetch(engine, url, &descriptor.service, &session.token()).await?;

    let mut headers = HeaderMap::new();
    for name in [CONTENT_TYPE, CONTENT_LENGTH] {
        copy_header(response.headers(), &mut headers, name);
    }
    headers.insert(CONTENT_DISPOSITION, disposition(&filename)?);

    let body = session
        .sink()
        .send_headers(StatusCode::OK, headers)
        .ok_or(StreamError::ClientGone)?;

    let s = session.clone();
    spawn_pipe(body_stream(response), body, session.token(), move |outcome| {
        s.shutdown(outcome.into_result());
    });
    Ok(())
}

/// Copy one header across the reqwest/axum `http` version boundary.
fn copy_header(from: &reqwest::header::HeaderMap, to: &mut HeaderMap, name: HeaderName) {
    let value = from
        .get(name.as_str())
        .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok());
    if let Some(value) = value {
        to.insert(name, value);
    }
}
