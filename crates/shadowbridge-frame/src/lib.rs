//! Call envelope parsing and downstream response framing.
//!
//! Inbound RPC payloads carry a fixed envelope in front of the body:
//! - A 10-byte opaque header
//! - A 4-byte message length indicator (MLI)
//! - The variable-length body that is forwarded downstream
//!
//! Replies from the downstream peer are captured by a [`ResponseFramer`].

pub mod envelope;
pub mod error;
pub mod framer;

pub use envelope::{
    encode_envelope, mli_for, Envelope, MliPolicy, HEADER_LEN, MIN_PAYLOAD_LEN, MLI_LEN,
};
pub use error::{FrameError, Result};
pub use framer::{
    encode_length_prefixed, ResponseFramer, DEFAULT_MAX_PAYLOAD, DEFAULT_READ_SIZE,
    LENGTH_PREFIX_LEN,
};
