//! gRPC front for a legacy byte-stream service.
//!
//! Each `shadowworkflow.Tasks/Call` payload carries a fixed envelope:
//! a 10-byte header and a 4-byte MLI are stripped, the body is written to a
//! single persistent downstream connection, and the reply is returned as-is.
//!
//! ```text
//! RPC caller ──Payload──▶ Bridge ──body──▶ downstream peer
//!            ◀──reply──          ◀─reply──
//! ```
//!
//! The [`Bridge`] owns the RPC listener, the server and the downstream
//! connection, and moves through `Constructed → Serving → Stopped`.

pub mod bridge;
pub mod channel;
pub mod config;
pub mod deadline;
pub mod error;
pub mod logger;
pub mod proto;
pub mod service;

#[cfg(test)]
mod test_support;

pub use bridge::{Bridge, BridgePhase};
pub use channel::SerializedStreamChannel;
pub use config::{BridgeConfig, TlsFiles, DEFAULT_DOWNSTREAM_HOST, DEFAULT_DOWNSTREAM_PORT};
pub use error::{BridgeError, Result};
pub use logger::Logger;
pub use proto::{Payload, TasksClient, TasksServer};
pub use service::{BridgeService, CallHandler};
