use std::time::Duration;

use crate::bridge::BridgePhase;

/// Errors that can occur while building, serving or using a bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failed to bind the RPC listener.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to establish the downstream connection.
    #[error("failed to establish downstream connection: {0}")]
    Connect(#[source] shadowbridge_transport::TransportError),

    /// TLS material could not be turned into server or client credentials.
    #[error("tls setup failed: {0}")]
    Tls(String),

    /// The caller sent a payload that does not carry a valid envelope.
    #[error("invalid payload: {0}")]
    MalformedPayload(#[source] shadowbridge_frame::FrameError),

    /// Writing the body downstream failed.
    #[error("failed to send data downstream: {0}")]
    DownstreamWrite(#[source] shadowbridge_transport::TransportError),

    /// Reading the downstream reply failed.
    #[error("failed to read response from downstream: {0}")]
    DownstreamRead(#[source] shadowbridge_frame::FrameError),

    /// The downstream exchange did not finish in time.
    #[error("downstream exchange timed out after {0:?}")]
    DownstreamTimeout(Duration),

    /// The downstream connection is closed or left unusable by an earlier failure.
    #[error("downstream connection unavailable: {0}")]
    DownstreamUnavailable(String),

    /// The requested lifecycle transition is not allowed from this phase.
    #[error("bridge is {0}")]
    InvalidState(BridgePhase),

    /// The RPC server stopped with an error.
    #[error("rpc server error: {0}")]
    Serve(#[from] tonic::transport::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<BridgeError> for tonic::Status {
    fn from(err: BridgeError) -> Self {
        let message = err.to_string();
        match err {
            BridgeError::MalformedPayload(_) => tonic::Status::invalid_argument(message),
            BridgeError::DownstreamWrite(_)
            | BridgeError::DownstreamRead(_)
            | BridgeError::DownstreamUnavailable(_) => tonic::Status::unavailable(message),
            BridgeError::DownstreamTimeout(_) => tonic::Status::deadline_exceeded(message),
            _ => tonic::Status::internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use shadowbridge_frame::FrameError;
    use shadowbridge_transport::TransportError;
    use tonic::Code;

    use super::*;

    #[test]
    fn malformed_payload_is_invalid_argument() {
        let status = tonic::Status::from(BridgeError::MalformedPayload(
            FrameError::InsufficientData { len: 3, min: 14 },
        ));
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(
            status.message(),
            "invalid payload: insufficient data (3 bytes, need at least 14)"
        );
    }

    #[test]
    fn downstream_failures_are_unavailable() {
        let write = tonic::Status::from(BridgeError::DownstreamWrite(TransportError::NotConnected));
        let read = tonic::Status::from(BridgeError::DownstreamRead(FrameError::ConnectionClosed));
        let gone = tonic::Status::from(BridgeError::DownstreamUnavailable("closed".to_string()));
        assert_eq!(write.code(), Code::Unavailable);
        assert_eq!(read.code(), Code::Unavailable);
        assert_eq!(gone.code(), Code::Unavailable);
    }

    #[test]
    fn timeout_is_deadline_exceeded() {
        let status = tonic::Status::from(BridgeError::DownstreamTimeout(Duration::from_secs(1)));
        assert_eq!(status.code(), Code::DeadlineExceeded);
    }

    #[test]
    fn lifecycle_errors_are_internal() {
        let status = tonic::Status::from(BridgeError::InvalidState(BridgePhase::Stopped));
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "bridge is stopped");
    }
}
