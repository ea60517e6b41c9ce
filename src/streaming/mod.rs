//! Media delivery engine.
//!
//! Takes a [`StreamDescriptor`] and produces one HTTP response, fetching from
//! the origin and running ffmpeg as the strategy requires.
//!
//! # Strategies
//!
//! - **Passthrough**: origin body forwarded unchanged
//! - **Live remux**: video URL (read by ffmpeg) and audio URL (piped in by the
//!   engine) muxed together
//! - **Audio-only**: audio track extracted, copied or re-encoded
//! - **Video-only**: stream-copied into a new container, optionally muted
//! - **GIF**: clip re-encoded as an animated GIF
//!
//! Every strategy runs a [`Session`]: any failure on any leg cancels the
//! other legs, stops ffmpeg and closes the response, exactly once.
//!
//! # Routes
//!
//! - `POST /api/stream` - Register a descriptor, returns its stream URL
//! - `GET /api/stream/{id}` - Deliver a registered stream

mod audio;
mod engine;
mod error;
pub mod fetch;
mod gif;
mod live;
mod passthrough;
pub mod pipe;
pub mod registry;
pub mod response;
pub mod session;
mod transcode;
mod video;

pub use audio::audio_only;
pub use engine::Engine;
pub use error::StreamError;
pub use gif::gif;
pub use live::live_remux;
pub use passthrough::passthrough;
pub use registry::{start_cleanup_task, StreamRegistry};
pub use response::{BodyWriter, ResponseSink};
pub use session::Session;
pub use video::video_only;

use axum::http::HeaderValue;
use mediaforge_common::filename::content_disposition;
use mediaforge_common::{StreamDescriptor, Strategy};

/// Deliver a descriptor with the strategy its kind selects.
///
/// Returns once the response has been closed and any ffmpeg process reaped.
pub async fn deliver(engine: &Engine, descriptor: StreamDescriptor, sink: ResponseSink) {
    let strategy = descriptor.strategy();
    tracing::info!(
        strategy = %strategy,
        service = %descriptor.service,
        "Delivering stream"
    );

    if let Err(e) = descriptor.validate() {
        let session = Session::new(sink, strategy, descriptor.service.clone());
        session.shutdown(Err(e.into()));
        return;
    }

    match strategy {
        Strategy::Passthrough => passthrough(engine, descriptor, sink).await,
        Strategy::LiveRemux => live_remux(engine, descriptor, sink).await,
        Strategy::AudioOnly => audio_only(engine, descriptor, sink).await,
        Strategy::VideoOnly => video_only(engine, descriptor, sink).await,
        Strategy::Gif => gif(engine, descriptor, sink).await,
    }
}

/// `Content-Disposition` header value for a download name.
fn disposition(filename: &str) -> Result<HeaderValue, StreamError> {
    HeaderValue::from_str(&content_disposition(filename))
        .map_err(|e| StreamError::Internal(format!("bad Content-Disposition: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::http::StatusCode;

    #[test]
    fn test_disposition_is_always_a_valid_header() {
        for name in ["clip.mp4", "клип.mp4", "a\"b\\c.mp3", "tab\there.gif"] {
            assert!(disposition(name).is_ok(), "{name}");
        }
    }

    #[tokio::test]
    async fn test_invalid_descriptor_gets_500() {
        let engine = Engine::new(&Config::default()).unwrap();
        let (sink, rx) = ResponseSink::new();

        deliver(&engine, StreamDescriptor::new("", "clip.mp4"), sink).await;
        assert_eq!(rx.await.unwrap().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_wrong_url_count_gets_500() {
        let engine = Engine::new(&Config::default()).unwrap();
        let (sink, rx) = ResponseSink::new();
        let descriptor = StreamDescriptor::new(
            vec!["http://127.0.0.1:9/a".to_string(), "http://127.0.0.1:9/b".to_string()],
            "clip.mp4",
        );

        // Passthrough needs exactly one URL.
        deliver(&engine, descriptor, sink).await;
        assert_eq!(rx.await.unwrap().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    async fn slow_origin() -> wiremock::MockServer {
        use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

        let origin = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(std::time::Duration::from_secs(30)),
            )
            .mount(&origin)
            .await;
        origin
    }

    /// Start delivery, let it block on the origin, then hang up.
    async fn hang_up_while_fetching(descriptor: StreamDescriptor) {
        let (sink, rx) = ResponseSink::new();
        let delivery = tokio::spawn(async move {
            let engine = Engine::new(&Config::default()).unwrap();
            deliver(&engine, descriptor, sink).await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!delivery.is_finished());
        drop(rx);

        tokio::time::timeout(std::time::Duration::from_secs(2), delivery)
            .await
            .expect("delivery kept waiting on the origin after the client left")
            .unwrap();
    }

    #[tokio::test]
    async fn test_passthrough_stops_fetching_when_client_leaves() {
        let origin = slow_origin().await;
        let descriptor = StreamDescriptor::new(format!("{}/video.mp4", origin.uri()), "clip.mp4");
        assert_eq!(descriptor.strategy(), Strategy::Passthrough);

        hang_up_while_fetching(descriptor).await;
    }

    #[tokio::test]
    async fn test_live_remux_stops_fetching_when_client_leaves() {
        let origin = slow_origin().await;
        let descriptor: StreamDescriptor = serde_json::from_value(serde_json::json!({
            "urls": ["http://127.0.0.1:9/video.m4s", format!("{}/audio.m4s", origin.uri())],
            "filename": "bili.mp4",
            "kind": "render"
        }))
        .unwrap();
        assert_eq!(descriptor.strategy(), Strategy::LiveRemux);

        hang_up_while_fetching(descriptor).await;
    }
}
