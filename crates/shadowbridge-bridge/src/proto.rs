//! Wire types and generated stubs for the `shadowworkflow.Tasks` service.

/// Opaque call payload: `[10-byte header][4-byte MLI][body]` on the way in,
/// the raw downstream reply on the way out.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Payload {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

include!(concat!(env!("OUT_DIR"), "/shadowworkflow.Tasks.rs"));

pub use tasks_client::TasksClient;
pub use tasks_server::{Tasks, TasksServer};
