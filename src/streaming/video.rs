//! Video-only: stream-copy into the container named by the filename.

use mediaforge_common::{StreamDescriptor, Strategy};

use super::response::ResponseSink;
use super::session::Session;
use super::{transcode, Engine, StreamError};

/// Remux the single URL without re-encoding, dropping audio for muted
/// descriptors.
///
/// Returns once the session has ended and ffmpeg has been reaped.
pub async fn video_only(engine: &Engine, descriptor: StreamDescriptor, sink: ResponseSink) {
    let session = Session::new(sink, Strategy::VideoOnly, descriptor.service.clone());
    let started = descriptor
        .single_url()
        .map_err(StreamError::from)
        .and_then(|url| {
            let invocation = engine.args().video_only(&descriptor, url);
            transcode::run(engine, &session, invocation, None)
        });
    if let Err(e) = started {
        session.shutdown(Err(e));
    }
    session.finished().await;
}
