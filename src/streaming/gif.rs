//! GIF conversion.

use mediaforge_common::{StreamDescriptor, Strategy};

use super::response::ResponseSink;
use super::session::Session;
use super::{transcode, Engine, StreamError};

/// Re-encode the single URL into an animated GIF named `<stem>.gif`.
pub async fn gif(engine: &Engine, descriptor: StreamDescriptor, sink: ResponseSink) {
    let session = Session::new(sink, Strategy::Gif, descriptor.service.clone());
    let started = descriptor
        .single_url()
        .map_err(StreamError::from)
        .and_then(|url| {
            let invocation = engine.args().gif(&descriptor, url);
            transcode::run(engine, &session, invocation, None)
        });
    if let Err(e) = started {
        session.shutdown(Err(e));
    }
    session.finished().await;
}
