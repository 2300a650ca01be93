//! Downstream byte-stream transport for shadowbridge.
//!
//! Owns exactly one live connection to the legacy peer:
//! - Plain TCP
//! - TCP secured with TLS (rustls, ring provider)
//!
//! This is the lowest layer of shadowbridge. Everything else builds on top of
//! the [`StreamConnection`] type provided here.

pub mod error;
pub mod stream;
pub mod tcp;
pub mod tls;

pub use error::{Result, TransportError};
pub use stream::StreamConnection;
pub use tcp::DownstreamTarget;
pub use tls::{client_config_from_pem, TlsIdentity};
