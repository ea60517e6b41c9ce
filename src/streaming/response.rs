//! The HTTP side of a delivery session.
//!
//! A [`ResponseSink`] is handed to a strategy while the request handler waits
//! on the paired receiver for the [`Response`]. Headers are committed with
//! [`ResponseSink::send_headers`], which is also the only way to obtain a
//! [`BodyWriter`], so no body byte can precede the headers.

use std::io;
use std::sync::Mutex;
use std::task::Poll;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Chunks buffered between a pipe and the HTTP body.
const BODY_BUFFER_CHUNKS: usize = 16;

enum Frame {
    Data(Bytes),
    End,
}

enum SinkState {
    Pending(oneshot::Sender<Response>),
    Committed,
    Closed,
}

/// Write side of one HTTP response.
pub struct ResponseSink {
    state: Mutex<SinkState>,
    destroy: CancellationToken,
}

impl std::fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSink")
            .field("headers_sent", &self.headers_sent())
            .finish()
    }
}

impl ResponseSink {
    /// Create a sink and the receiver the request handler awaits.
    pub fn new() -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        let sink = Self {
            state: Mutex::new(SinkState::Pending(tx)),
            destroy: CancellationToken::new(),
        };
        (sink, rx)
    }

    /// Commit the status line and headers.
    ///
    /// Returns `None` when headers were already committed, the response was
    /// closed, or the client is no longer waiting.
    pub fn send_headers(&self, status: StatusCode, headers: HeaderMap) -> Option<BodyWriter> {
        let mut state = self.state.lock().ok()?;
        let tx = match std::mem::replace(&mut *state, SinkState::Committed) {
            SinkState::Pending(tx) => tx,
            other => {
                *state = other;
                return None;
            }
        };

        let (body_tx, body_rx) = mpsc::channel(BODY_BUFFER_CHUNKS);
        let mut response = Response::new(Body::from_stream(body_stream(
            body_rx,
            self.destroy.clone(),
        )));
        *response.status_mut() = status;
        *response.headers_mut() = headers;

        match tx.send(response) {
            Ok(()) => Some(BodyWriter { tx: Some(body_tx) }),
            Err(_) => None,
        }
    }

    /// Whether headers have been committed.
    pub fn headers_sent(&self) -> bool {
        self.state
            .lock()
            .map(|state| !matches!(*state, SinkState::Pending(_)))
            .unwrap_or(true)
    }

    /// Resolves once the request handler has stopped waiting for the
    /// response, which happens when the client disconnects. Never resolves
    /// after headers are committed; [`BodyWriter::closed`] covers that phase.
    pub async fn client_gone(&self) {
        std::future::poll_fn(|cx| match self.state.lock() {
            Ok(mut state) => match &mut *state {
                SinkState::Pending(tx) => tx.poll_closed(cx),
                _ => Poll::Pending,
            },
            Err(_) => Poll::Pending,
        })
        .await
    }

    /// End the response.
    ///
    /// Before headers this sends a bare 500. After headers a failed session
    /// aborts the body so the client sees a truncated transfer; a successful
    /// one leaves the body to end once the writer has finished it.
    pub fn close(&self, success: bool) {
        let previous = match self.state.lock() {
            Ok(mut state) => std::mem::replace(&mut *state, SinkState::Closed),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), SinkState::Closed),
        };
        match previous {
            SinkState::Pending(tx) => {
                let _ = tx.send(StatusCode::INTERNAL_SERVER_ERROR.into_response());
            }
            SinkState::Committed if !success => self.destroy.cancel(),
            _ => {}
        }
    }
}

/// Body stream: data until an explicit end. A writer dropped without ending
/// the body, or a destroyed sink, turns into an error so the connection is
/// cut instead of looking complete.
fn body_stream(
    rx: mpsc::Receiver<Frame>,
    destroy: CancellationToken,
) -> impl futures::Stream<Item = io::Result<Bytes>> + Send + 'static {
    futures::stream::unfold(Some((rx, destroy)), |state| async move {
        let (mut rx, destroy) = state?;
        let frame = tokio::select! {
            biased;
            _ = destroy.cancelled() => None,
            frame = rx.recv() => frame,
        };
        match frame {
            Some(Frame::Data(chunk)) => Some((Ok(chunk), Some((rx, destroy)))),
            Some(Frame::End) => None,
            None => Some((
                Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "stream aborted",
                )),
                None,
            )),
        }
    })
}

/// Writes the body of a committed response.
#[derive(Debug)]
pub struct BodyWriter {
    tx: Option<mpsc::Sender<Frame>>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data(chunk) => write!(f, "Data({} bytes)", chunk.len()),
            Self::End => write!(f, "End"),
        }
    }
}

impl BodyWriter {
    /// Queue a chunk for the client.
    ///
    /// Fails with `BrokenPipe` once the client has gone away or the body has
    /// been finished.
    pub async fn write(&self, chunk: Bytes) -> io::Result<()> {
        let tx = self.tx.as_ref().ok_or_else(finished)?;
        tx.send(Frame::Data(chunk))
            .await
            .map_err(|_| disconnected())
    }

    /// Mark the body complete. Later writes fail.
    pub async fn finish(&mut self) -> io::Result<()> {
        let tx = self.tx.take().ok_or_else(finished)?;
        tx.send(Frame::End).await.map_err(|_| disconnected())
    }

    /// Resolves once the client has stopped reading the body.
    pub async fn closed(&self) {
        match &self.tx {
            Some(tx) => tx.closed().await,
            None => std::future::pending().await,
        }
    }
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
}

fn finished() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "body already finished")
}
