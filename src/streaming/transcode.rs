//! Wiring shared by every strategy that runs ffmpeg.

use std::sync::Arc;

use axum::http::header::{CONNECTION, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use mediaforge_av::{ChannelRole, FfmpegInvocation};
use mediaforge_common::filename::content_type;
use tokio_util::io::ReaderStream;

use super::fetch::body_stream;
use super::pipe::spawn_pipe;
use super::session::Session;
use super::{disposition, Engine, StreamError};

/// Spawn ffmpeg for `invocation` and connect it to the session.
///
/// `input`, when given, is piped into the invocation's input channel. Its
/// end is not an error; only a failed transfer ends the session. The output
/// channel is piped into the response. When ffmpeg exits cleanly the session
/// ends once the output has drained; any other exit ends it at once.
pub(super) fn run(
    engine: &Engine,
    session: &Arc<Session>,
    invocation: FfmpegInvocation,
    input: Option<reqwest::Response>,
) -> Result<(), StreamError> {
    let process = Arc::new(engine.spawn(&invocation)?);
    session.attach_process(process.clone());

    let output = channel_index(&invocation, ChannelRole::ExtraOutput)
        .and_then(|index| process.take_output(index))
        .ok_or_else(|| StreamError::Internal("transcoder has no output channel".into()))?;

    if let Some(response) = input {
        let writer = channel_index(&invocation, ChannelRole::ExtraInput)
            .and_then(|index| process.take_input(index))
            .ok_or_else(|| StreamError::Internal("transcoder has no input channel".into()))?;

        let s = session.clone();
        spawn_pipe(body_stream(response), writer, session.token(), move |outcome| {
            if let Err(e) = outcome.into_result() {
                s.shutdown(Err(e));
            }
        });
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(content_type(&invocation.format)),
    );
    headers.insert(CONTENT_DISPOSITION, disposition(&invocation.filename)?);
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

    let body = session
        .sink()
        .send_headers(StatusCode::OK, headers)
        .ok_or(StreamError::ClientGone)?;

    let s = session.clone();
    let output_pipe = spawn_pipe(
        ReaderStream::new(output),
        body,
        session.token(),
        move |outcome| {
            if let Err(e) = outcome.into_result() {
                s.shutdown(Err(e));
            }
        },
    );

    let s = session.clone();
    tokio::spawn(async move {
        let exit = process.wait().await;
        if exit.success() {
            let _ = output_pipe.await;
            s.shutdown(Ok(()));
        } else {
            s.shutdown(Err(StreamError::ProcessFailed(exit)));
        }
    });

    Ok(())
}

fn channel_index(invocation: &FfmpegInvocation, role: ChannelRole) -> Option<usize> {
    invocation.channels.iter().position(|r| *r == role)
}
