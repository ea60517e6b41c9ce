//! Error types for mediaforge-av.

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing or running a transcode.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// The transcoder could not be started.
    #[error("failed to spawn {tool}: {message}")]
    SpawnFailed { tool: String, message: String },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported operation on this platform.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a spawn failure error.
    pub fn spawn_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

#[cfg(unix)]
impl From<nix::errno::Errno> for Error {
    fn from(err: nix::errno::Errno) -> Self {
        Error::Io(err.into())
    }
}
