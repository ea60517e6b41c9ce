//! Origin fetches.

use std::io;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::{Engine, StreamError};

/// GET `url` with the engine's identity and the service's referer.
///
/// The request is raced against `cancel`. Non-2xx responses are errors.
pub async fn fetch(
    engine: &Engine,
    url: &str,
    service: &str,
    cancel: &CancellationToken,
) -> Result<reqwest::Response, StreamError> {
    let mut request = engine.client().get(url);
    if let Some(referer) = engine.quirks().referer(service) {
        request = request.header(reqwest::header::REFERER, referer);
    }

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(StreamError::Cancelled),
        response = request.send() => response?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(StreamError::Status(status.as_u16()));
    }
    Ok(response)
}

/// Body of a response as a pipe source.
pub fn body_stream(response: reqwest::Response) -> impl Stream<Item = io::Result<Bytes>> + Send {
    response
        .bytes_stream()
        .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e)))
}
