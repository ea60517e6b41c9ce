//! Delivery sessions.
//!
//! A [`Session`] ties together everything one request owns: the cancellation
//! token shared by every fetch and pipe, the transcoder (if any) and the
//! response. [`Session::shutdown`] tears all of it down exactly once, no
//! matter how many legs report a failure at the same time.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use mediaforge_av::TranscodeProcess;
use mediaforge_common::Strategy;
use tokio_util::sync::CancellationToken;

use super::response::ResponseSink;
use super::StreamError;

/// State of one delivery.
#[derive(Debug)]
pub struct Session {
    strategy: Strategy,
    service: String,
    cancel: CancellationToken,
    process: Mutex<Option<Arc<TranscodeProcess>>>,
    sink: ResponseSink,
    shut_down: AtomicBool,
    terminated: CancellationToken,
}

impl Session {
    pub fn new(sink: ResponseSink, strategy: Strategy, service: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            strategy,
            service: service.into(),
            cancel: CancellationToken::new(),
            process: Mutex::new(None),
            sink,
            shut_down: AtomicBool::new(false),
            terminated: CancellationToken::new(),
        })
    }

    /// Token every fetch and pipe of this session races against.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn sink(&self) -> &ResponseSink {
        &self.sink
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Run the part of a strategy that precedes the headers, giving up with
    /// [`StreamError::ClientGone`] as soon as the client disconnects.
    pub async fn before_headers<F>(&self, start: F) -> Result<(), StreamError>
    where
        F: Future<Output = Result<(), StreamError>>,
    {
        tokio::select! {
            biased;
            _ = self.sink.client_gone() => Err(StreamError::ClientGone),
            result = start => result,
        }
    }

    /// Attach the session's transcoder.
    ///
    /// A process attached after shutdown is terminated immediately. The slot
    /// lock orders this against [`Session::shutdown`], so one of the two
    /// always sees the other.
    pub fn attach_process(&self, process: Arc<TranscodeProcess>) {
        let mut slot = self.process_slot();
        if slot.is_some() {
            drop(slot);
            tracing::error!(strategy = %self.strategy, "Session already has a transcoder");
            process.terminate();
            return;
        }
        *slot = Some(process.clone());
        let shut_down = self.is_shut_down();
        drop(slot);

        if shut_down {
            process.terminate();
        }
    }

    pub fn process(&self) -> Option<Arc<TranscodeProcess>> {
        self.process_slot().clone()
    }

    fn process_slot(&self) -> MutexGuard<'_, Option<Arc<TranscodeProcess>>> {
        self.process.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// End the session: cancel fetches and pipes, stop the transcoder, close
    /// the response.
    ///
    /// Returns `true` for the one call that performed the teardown.
    pub fn shutdown(&self, result: Result<(), StreamError>) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }

        match &result {
            Ok(()) => tracing::debug!(
                strategy = %self.strategy,
                service = %self.service,
                "Stream completed"
            ),
            Err(e) if e.is_disconnect() => tracing::debug!(
                strategy = %self.strategy,
                service = %self.service,
                "Stream aborted: {}",
                e
            ),
            Err(e) => tracing::warn!(
                strategy = %self.strategy,
                service = %self.service,
                headers_sent = self.sink.headers_sent(),
                "Stream failed: {}",
                e
            ),
        }

        self.cancel.cancel();
        if let Some(process) = self.process() {
            process.terminate();
        }
        self.sink.close(result.is_ok());
        self.terminated.cancel();
        true
    }

    /// Wait for shutdown to complete, then for the transcoder to be reaped.
    pub async fn finished(&self) {
        self.terminated.cancelled().await;
        if let Some(process) = self.process() {
            process.wait().await;
        }
    }
}
