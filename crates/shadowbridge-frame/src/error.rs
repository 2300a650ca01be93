/// Errors that can occur while splitting payloads or framing responses.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload is shorter than the fixed envelope.
    #[error("insufficient data ({len} bytes, need at least {min})")]
    InsufficientData { len: usize, min: usize },

    /// The MLI does not match the body length (strict policy only).
    #[error("message length indicator {declared} does not match body length {actual}")]
    LengthMismatch { declared: u32, actual: usize },

    /// The response exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading a response.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete response was received.
    #[error("connection closed (incomplete response)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
