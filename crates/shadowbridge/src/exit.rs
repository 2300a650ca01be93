use std::fmt;
use std::io;

use shadowbridge_bridge::BridgeError;
use shadowbridge_transport::TransportError;
use tonic::Code;

// Exit code constants aligned with sysexits-style semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        TransportError::InvalidServerName(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn bridge_error(context: &str, err: BridgeError) -> CliError {
    match err {
        BridgeError::Config(_) => CliError::new(USAGE, format!("{context}: {err}")),
        BridgeError::Listen { source, .. } => io_error(context, source),
        BridgeError::Connect(err) => transport_error(context, err),
        BridgeError::Tls(_) | BridgeError::MalformedPayload(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        BridgeError::DownstreamTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        BridgeError::DownstreamWrite(_)
        | BridgeError::DownstreamRead(_)
        | BridgeError::DownstreamUnavailable(_)
        | BridgeError::Serve(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn status_error(context: &str, status: tonic::Status) -> CliError {
    let code = match status.code() {
        Code::InvalidArgument => DATA_INVALID,
        Code::DeadlineExceeded => TIMEOUT,
        Code::Unavailable => TRANSPORT_ERROR,
        Code::Internal | Code::Unknown => INTERNAL,
        _ => FAILURE,
    };
    CliError::new(
        code,
        format!("{context}: {:?}: {}", status.code(), status.message()),
    )
}

pub fn rpc_transport_error(context: &str, err: tonic::transport::Error) -> CliError {
    CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shadowbridge_frame::FrameError;

    use super::*;

    #[test]
    fn status_codes_map_to_exit_codes() {
        let invalid = status_error("call failed", tonic::Status::invalid_argument("short"));
        assert_eq!(invalid.code, DATA_INVALID);
        assert_eq!(invalid.message, "call failed: InvalidArgument: short");

        assert_eq!(
            status_error("x", tonic::Status::deadline_exceeded("slow")).code,
            TIMEOUT
        );
        assert_eq!(
            status_error("x", tonic::Status::unavailable("gone")).code,
            TRANSPORT_ERROR
        );
        assert_eq!(status_error("x", tonic::Status::not_found("?")).code, FAILURE);
    }

    #[test]
    fn bridge_errors_map_to_exit_codes() {
        assert_eq!(
            bridge_error("x", BridgeError::Config("missing listen address".into())).code,
            USAGE
        );
        assert_eq!(
            bridge_error(
                "x",
                BridgeError::MalformedPayload(FrameError::InsufficientData { len: 1, min: 14 })
            )
            .code,
            DATA_INVALID
        );
        assert_eq!(
            bridge_error("x", BridgeError::DownstreamTimeout(Duration::from_secs(1))).code,
            TIMEOUT
        );
        let refused = BridgeError::Connect(TransportError::Connect {
            addr: "127.0.0.1:6000".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        });
        assert_eq!(bridge_error("x", refused).code, FAILURE);
    }
}
