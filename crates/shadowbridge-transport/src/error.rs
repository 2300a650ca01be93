/// Errors that can occur on the downstream stream connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open a TCP connection to the downstream address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// The TLS handshake with the downstream peer failed.
    #[error("tls handshake with {addr} failed: {source}")]
    Handshake {
        addr: String,
        source: std::io::Error,
    },

    /// The configured TLS server name is not a valid DNS name or IP address.
    #[error("invalid tls server name: {0}")]
    InvalidServerName(String),

    /// TLS material could not be parsed or assembled into a client config.
    #[error("invalid tls material: {0}")]
    Tls(String),

    /// An I/O error occurred on the stream.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection has already been closed locally.
    #[error("connection not open")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, TransportError>;
