//! gRPC front for legacy TCP/TLS byte-stream services.
//!
//! shadowbridge accepts `shadowworkflow.Tasks/Call` RPCs, strips a fixed
//! 14-byte envelope from each payload and forwards the body over one
//! persistent downstream connection.
//!
//! # Crate Structure
//!
//! - [`transport`]: Downstream stream connection (TCP, TLS)
//! - [`frame`]: Call envelope parsing and response framing
//! - [`bridge`]: RPC service, configuration and lifecycle (behind `bridge` feature)

/// Re-export transport types.
pub mod transport {
    pub use shadowbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use shadowbridge_frame::*;
}

/// Re-export bridge types (requires `bridge` feature).
#[cfg(feature = "bridge")]
pub mod bridge {
    pub use shadowbridge_bridge::*;
}
