//! Audio-only: extract the audio track, copying or re-encoding it.

use mediaforge_common::{StreamDescriptor, Strategy};

use super::response::ResponseSink;
use super::session::Session;
use super::{transcode, Engine, StreamError};

/// Deliver the audio of the single URL as `<filename>.<audioFormat>`.
///
/// Returns once the session has ended and ffmpeg has been reaped.
pub async fn audio_only(engine: &Engine, descriptor: StreamDescriptor, sink: ResponseSink) {
    let session = Session::new(sink, Strategy::AudioOnly, descriptor.service.clone());
    let started = descriptor
        .single_url()
        .map_err(StreamError::from)
        .and_then(|url| {
            let invocation = engine.args().audio_only(&descriptor, url);
            transcode::run(engine, &session, invocation, None)
        });
    if let Err(e) = started {
        session.shutdown(Err(e));
    }
    session.finished().await;
}
