//! Live remux: a video URL read by ffmpeg plus an audio URL fetched by the
//! engine, muxed into one file.

use std::sync::Arc;

use mediaforge_common::{StreamDescriptor, Strategy};

use super::fetch::fetch;
use super::response::ResponseSink;
use super::session::Session;
use super::{transcode, Engine, StreamError};

/// Mux the descriptor's `[primary, secondary]` URLs into one response.
///
/// Any URL count other than two ends the session before any fetch or spawn.
/// Returns once the session has ended and ffmpeg has been reaped.
pub async fn live_remux(engine: &Engine, descriptor: StreamDescriptor, sink: ResponseSink) {
    let session = Session::new(sink, Strategy::LiveRemux, descriptor.service.clone());
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
    let (primary, secondary) = descriptor.url_pair()?;
    let secondary = fetch(engine, secondary, &descriptor.service, &session.token()).await?;

    let invocation = engine.args().live_remux(descriptor, primary);
    transcode::run(engine, session, invocation, Some(secondary))
}
