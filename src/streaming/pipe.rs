//! Byte forwarding between the legs of a delivery session.
//!
//! [`spawn_pipe`] moves chunks from a source stream into a [`ByteSink`] on
//! its own task and reports how the transfer ended through a one-shot
//! continuation. Errors on either side end the transfer; they never escape
//! the task.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use mediaforge_av::process::ChannelWriter;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::response::BodyWriter;
use super::StreamError;

/// Destination of a pipe.
#[async_trait]
pub trait ByteSink: Send {
    /// Deliver one chunk.
    async fn send(&mut self, chunk: Bytes) -> io::Result<()>;

    /// Signal that no more chunks follow.
    async fn close(&mut self) -> io::Result<()>;

    /// Resolves when the consumer has gone away. Never resolves by default.
    async fn closed(&mut self) {
        std::future::pending::<()>().await
    }

    /// Outcome for a failed `send` or `close`.
    fn write_failed(&self, e: io::Error) -> PipeOutcome {
        PipeOutcome::SinkFailed(e)
    }
}

#[async_trait]
impl ByteSink for BodyWriter {
    async fn send(&mut self, chunk: Bytes) -> io::Result<()> {
        self.write(chunk).await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.finish().await
    }

    async fn closed(&mut self) {
        BodyWriter::closed(self).await
    }

    /// A broken body channel means the client hung up.
    fn write_failed(&self, e: io::Error) -> PipeOutcome {
        if e.kind() == io::ErrorKind::BrokenPipe {
            PipeOutcome::SinkClosed
        } else {
            PipeOutcome::SinkFailed(e)
        }
    }
}

#[async_trait]
impl ByteSink for ChannelWriter {
    async fn send(&mut self, chunk: Bytes) -> io::Result<()> {
        self.write_all(&chunk).await
    }

    async fn close(&mut self) -> io::Result<()> {
        // The descriptor itself closes when the writer is dropped.
        self.flush().await
    }
}

/// How a pipe ended.
#[derive(Debug)]
pub enum PipeOutcome {
    /// The source ended and the sink was closed cleanly.
    Finished,
    /// Reading the source failed.
    SourceFailed(io::Error),
    /// Writing the sink failed.
    SinkFailed(io::Error),
    /// The sink's consumer went away.
    SinkClosed,
    /// The session was cancelled.
    Cancelled,
}

impl PipeOutcome {
    /// `Ok` for a finished transfer, the matching error otherwise.
    pub fn into_result(self) -> Result<(), StreamError> {
        match self {
            Self::Finished => Ok(()),
            Self::SourceFailed(e) => Err(StreamError::Source(e)),
            Self::SinkFailed(e) => Err(StreamError::Sink(e)),
            Self::SinkClosed => Err(StreamError::ClientGone),
            Self::Cancelled => Err(StreamError::Cancelled),
        }
    }
}

/// Forward `source` into `sink` on a new task.
///
/// `on_end` runs exactly once, after the sink has been dropped.
pub fn spawn_pipe<S, K, F>(
    source: S,
    sink: K,
    cancel: CancellationToken,
    on_end: F,
) -> JoinHandle<()>
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    K: ByteSink + 'static,
    F: FnOnce(PipeOutcome) + Send + 'static,
{
    tokio::spawn(async move {
        let outcome = forward(source, sink, &cancel).await;
        on_end(outcome);
    })
}

/// Forward `source` into `sink` until one of them ends or `cancel` fires.
pub async fn forward<S, K>(source: S, mut sink: K, cancel: &CancellationToken) -> PipeOutcome
where
    S: Stream<Item = io::Result<Bytes>> + Send,
    K: ByteSink,
{
    let mut source = std::pin::pin!(source);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PipeOutcome::Cancelled,
            _ = sink.closed() => return PipeOutcome::SinkClosed,
            next = source.next() => next,
        };

        match next {
            Some(Ok(chunk)) if chunk.is_empty() => continue,
            Some(Ok(chunk)) => {
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return PipeOutcome::Cancelled,
                    sent = sink.send(chunk) => sent,
                };
                if let Err(e) = sent {
                    return sink.write_failed(e);
                }
            }
            Some(Err(e)) => return PipeOutcome::SourceFailed(e),
            None => {
                return match sink.close().await {
                    Ok(()) => PipeOutcome::Finished,
                    Err(e) => sink.write_failed(e),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    #[derive(Default, Clone)]
    struct Recorder {
        chunks: Arc<Mutex<Vec<Bytes>>>,
        closed: Arc<Mutex<bool>>,
        fail_send: Option<io::ErrorKind>,
    }

    #[async_trait]
    impl ByteSink for Recorder {
        async fn send(&mut self, chunk: Bytes) -> io::Result<()> {
            if let Some(kind) = self.fail_send {
                return Err(io::Error::new(kind, "disk on fire"));
            }
            self.chunks.lock().unwrap().push(chunk);
            Ok(())
        }

        async fn close(&mut self) -> io::Result<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn chunks(items: Vec<io::Result<&'static [u8]>>) -> impl Stream<Item = io::Result<Bytes>> {
        futures::stream::iter(items.into_iter().map(|r| r.map(Bytes::from_static)))
    }

    #[tokio::test]
    async fn test_finished() {
        let sink = Recorder::default();
        let cancel = CancellationToken::new();
        let outcome = forward(
            chunks(vec![Ok(b"a"), Ok(b""), Ok(b"b")]),
            sink.clone(),
            &cancel,
        )
        .await;

        assert_matches!(outcome, PipeOutcome::Finished);
        assert_eq!(sink.chunks.lock().unwrap().len(), 2);
        assert!(*sink.closed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_source_error() {
        let sink = Recorder::default();
        let cancel = CancellationToken::new();
        let outcome = forward(
            chunks(vec![
                Ok(b"a"),
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            ]),
            sink.clone(),
            &cancel,
        )
        .await;

        assert_matches!(outcome, PipeOutcome::SourceFailed(_));
        assert!(!*sink.closed.lock().unwrap());
        assert!(outcome_is_err(outcome));
    }

    fn outcome_is_err(outcome: PipeOutcome) -> bool {
        outcome.into_result().is_err()
    }

    #[tokio::test]
    async fn test_sink_error() {
        let sink = Recorder {
            fail_send: Some(io::ErrorKind::Other),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let outcome = forward(chunks(vec![Ok(b"a")]), sink, &cancel).await;
        assert_matches!(outcome, PipeOutcome::SinkFailed(_));
    }

    #[tokio::test]
    async fn test_cancelled_while_waiting_on_source() {
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let handle = spawn_pipe(
            futures::stream::pending(),
            Recorder::default(),
            cancel.clone(),
            move |outcome| {
                let _ = tx.send(outcome);
            },
        );

        cancel.cancel();
        assert_matches!(rx.await.unwrap(), PipeOutcome::Cancelled);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_body_writer_client_gone() {
        use super::super::response::ResponseSink;
        use axum::http::{HeaderMap, StatusCode};

        let (sink, rx) = ResponseSink::new();
        let writer = sink.send_headers(StatusCode::OK, HeaderMap::new()).unwrap();
        drop(rx.await.unwrap());

        let cancel = CancellationToken::new();
        let outcome = forward(futures::stream::pending(), writer, &cancel).await;
        assert_matches!(outcome, PipeOutcome::SinkClosed);
    }

    #[tokio::test]
    async fn test_broken_pipe_is_a_sink_failure_by_default() {
        let sink = Recorder {
            fail_send: Some(io::ErrorKind::BrokenPipe),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let outcome = forward(chunks(vec![Ok(b"a")]), sink, &cancel).await;
        assert_matches!(outcome, PipeOutcome::SinkFailed(_));
    }

    #[tokio::test]
    async fn test_transcoder_input_gone_is_not_a_client_disconnect() {
        let (writer, reader) = tokio::io::duplex(64);
        drop(reader);
        let writer: ChannelWriter = Box::new(writer);

        let cancel = CancellationToken::new();
        let outcome = forward(chunks(vec![Ok(b"secondary")]), writer, &cancel).await;
        assert_matches!(
            outcome.into_result(),
            Err(StreamError::Sink(e)) if e.kind() == io::ErrorKind::BrokenPipe
        );
    }
}
