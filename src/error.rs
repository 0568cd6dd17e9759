use thiserror::Error;

/// Errors that can occur while opening sessions or exchanging samples
#[derive(Error, Debug)]
pub enum Error {
    /// A string could not be turned into a key expression
    #[error("invalid key expression `{expr}`: {reason}")]
    InvalidKeyExpr {
        /// The rejected input.
        expr: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Configuration is malformed or self-contradictory
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An endpoint string could not be parsed
    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    /// The session (or the entity's parent session) was closed
    #[error("session closed")]
    SessionClosed,

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Socket or file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Non-retryable transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Transient transport failure; eligible for retry with backoff
    #[error("transport error (retryable): {0}")]
    TransportRetryable(String),

    /// Peer announced a frame larger than the accepted maximum
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    /// Operation did not complete in time
    #[error("operation timed out")]
    Timeout,
}

/// Result type alias for pub/sub operations
pub type Result<T> = std::result::Result<T, Error>;
