use std::time::Duration;

use thiserror::Error;

/// Failures on the path from a reading to the time-series store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForwardError {
    /// The HTTP client could not be built from the storage settings
    #[error("Failed to set up storage client: {0}")]
    ClientSetup(String),

    /// The endpoint answered with something other than 204 No Content.
    /// Never retried.
    #[error("Storage endpoint answered {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection, TLS or timeout failure before a response arrived
    #[error("Storage endpoint unreachable: {0}")]
    Transport(String),

    /// The forwarding queue stayed full for the whole enqueue timeout
    #[error("Forwarding queue full for {0:?}, reading dropped")]
    QueueFull(Duration),

    /// The worker task is gone
    #[error("Forwarding worker stopped")]
    WorkerStopped,
}

impl ForwardError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ForwardError::Transport(_))
    }
}
