use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// No connection id could be obtained within the protocol timeout.
    #[error("failed to obtain tracker connection id")]
    ConnectionId,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Reserved operation with no implementation.
    #[error("operation not supported")]
    Unsupported,
}
