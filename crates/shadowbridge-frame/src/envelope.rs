use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// Opaque header at the front of every call payload.
pub const HEADER_LEN: usize = 10;

/// Message length indicator that follows the header.
pub const MLI_LEN: usize = 4;

/// Shortest payload that carries a complete envelope (empty body).
pub const MIN_PAYLOAD_LEN: usize = HEADER_LEN + MLI_LEN;

/// How the message length indicator is checked against the body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MliPolicy {
    /// Extract the MLI for diagnostics but never check it.
    #[default]
    Ignore,
    /// Reject payloads whose big-endian MLI differs from the body length.
    Strict,
}

/// A call payload split into its envelope fields.
///
/// Wire format:
/// ```text
/// ┌────────────────┬────────────┬──────────────────────┐
/// │ Header (10B)   │ MLI (4B)   │ Body                 │
/// │ opaque         │ opaque     │ forwarded downstream │
/// └────────────────┴────────────┴──────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub header: &'a [u8; HEADER_LEN],
    pub mli: &'a [u8; MLI_LEN],
    pub body: &'a [u8],
}

impl<'a> Envelope<'a> {
    /// Split a payload without checking the MLI.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        Self::parse_with_policy(payload, MliPolicy::Ignore)
    }

    /// Split a payload, applying `policy` to the MLI.
    pub fn parse_with_policy(payload: &'a [u8], policy: MliPolicy) -> Result<Self> {
        let insufficient = || FrameError::InsufficientData {
            len: payload.len(),
            min: MIN_PAYLOAD_LEN,
        };
        let (header, rest) = payload
            .split_first_chunk::<HEADER_LEN>()
            .ok_or_else(insufficient)?;
        let (mli, body) = rest.split_first_chunk::<MLI_LEN>().ok_or_else(insufficient)?;

        let envelope = Self { header, mli, body };
        if policy == MliPolicy::Strict && envelope.declared_len() as usize != body.len() {
            return Err(FrameError::LengthMismatch {
                declared: envelope.declared_len(),
                actual: body.len(),
            });
        }
        Ok(envelope)
    }

    /// The MLI read as a big-endian length.
    pub fn declared_len(&self) -> u32 {
        u32::from_be_bytes(*self.mli)
    }
}

/// Big-endian MLI for a body, as the strict policy expects it.
pub fn mli_for(body: &[u8]) -> Result<[u8; MLI_LEN]> {
    let len = u32::try_from(body.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: body.len(),
        max: u32::MAX as usize,
    })?;
    Ok(len.to_be_bytes())
}

/// Assemble `[header][mli][body]` into `dst`.
pub fn encode_envelope(
    header: &[u8; HEADER_LEN],
    mli: &[u8; MLI_LEN],
    body: &[u8],
    dst: &mut BytesMut,
) {
    dst.reserve(MIN_PAYLOAD_LEN + body.len());
    dst.put_slice(header);
    dst.put_slice(mli);
    dst.put_slice(body);
}
