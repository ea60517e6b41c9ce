//! Delivery errors.
//!
//! None of these reach the client as a message: before headers a failure is a
//! bare 500, after headers it is a truncated body. They exist for logging.

use mediaforge_av::ProcessExit;

/// Why a delivery session ended early.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The descriptor does not fit the selected strategy.
    #[error("invalid stream descriptor: {0}")]
    InvalidDescriptor(#[from] mediaforge_common::Error),

    /// The origin request failed (network, TLS, too many redirects).
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The origin answered with a non-success status.
    #[error("origin responded with status {0}")]
    Status(u16),

    /// The transcoder could not be started.
    #[error("transcoder error: {0}")]
    Process(#[from] mediaforge_av::Error),

    /// The transcoder exited unsuccessfully.
    #[error("transcoder did not finish cleanly: {0:?}")]
    ProcessFailed(ProcessExit),

    /// Reading from a source failed mid-transfer.
    #[error("source failed: {0}")]
    Source(std::io::Error),

    /// Writing to a sink failed mid-transfer.
    #[error("sink failed: {0}")]
    Sink(std::io::Error),

    /// The client went away.
    #[error("client disconnected")]
    ClientGone,

    /// The session was torn down by another leg.
    #[error("cancelled")]
    Cancelled,

    /// A wiring invariant did not hold.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StreamError {
    /// Whether this is a consequence of the client leaving rather than a
    /// fault worth a warning.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ClientGone | Self::Cancelled)
    }
}
