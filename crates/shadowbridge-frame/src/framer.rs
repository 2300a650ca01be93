use std::io::ErrorKind;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{FrameError, Result};

/// Read buffer used by the legacy single-read strategy.
pub const DEFAULT_READ_SIZE: usize = 1024;

/// Length prefix: 4-byte big-endian payload length.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default maximum length-prefixed response: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// How a reply is captured from the downstream stream.
///
/// The request body is always written unchanged; only the read side differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResponseFramer {
    /// Return whatever one underlying read yields, up to `max_bytes`.
    ///
    /// Lossy: a reply split across several segments is truncated to the
    /// first one, and the remainder is left in the stream.
    BestEffortSingleRead {
        #[serde(default = "default_read_size")]
        max_bytes: usize,
    },

    /// Read a 4-byte big-endian length, then exactly that many bytes.
    ///
    /// ```text
    /// ┌──────────────┬─────────────────┐
    /// │ Length (4B)  │ Payload         │
    /// │ big-endian   │ (Length bytes)  │
    /// └──────────────┴─────────────────┘
    /// ```
    LengthPrefixed {
        #[serde(default = "default_max_payload")]
        max_payload: usize,
    },
}

fn default_read_size() -> usize {
    DEFAULT_READ_SIZE
}

fn default_max_payload() -> usize {
    DEFAULT_MAX_PAYLOAD
}

impl Default for ResponseFramer {
    fn default() -> Self {
        Self::BestEffortSingleRead {
            max_bytes: DEFAULT_READ_SIZE,
        }
    }
}

impl ResponseFramer {
    /// Length-prefixed framing with the default size limit.
    pub fn length_prefixed() -> Self {
        Self::LengthPrefixed {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Strategy name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BestEffortSingleRead { .. } => "best-effort-single-read",
            Self::LengthPrefixed { .. } => "length-prefixed",
        }
    }

    /// Read one response from `reader`.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached first.
    pub async fn read_response<R>(&self, reader: &mut R) -> Result<Bytes>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        match *self {
            Self::BestEffortSingleRead { max_bytes } => read_once(reader, max_bytes).await,
            Self::LengthPrefixed { max_payload } => read_prefixed(reader, max_payload).await,
        }
    }
}

async fn read_once<R>(reader: &mut R, max_bytes: usize) -> Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = BytesMut::zeroed(max_bytes);
    let read = loop {
        match reader.read(&mut buf[..]).await {
            Ok(n) => break n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    };

    if read == 0 && max_bytes > 0 {
        return Err(FrameError::ConnectionClosed);
    }

    buf.truncate(read);
    Ok(buf.freeze())
}

async fn read_prefixed<R>(reader: &mut R, max_payload: usize) -> Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    read_full(reader, &mut prefix).await?;

    let payload_len = u32::from_be_bytes(prefix) as usize;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let mut buf = BytesMut::zeroed(payload_len);
    read_full(reader, &mut buf[..]).await?;
    Ok(buf.freeze())
}

async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Err(FrameError::ConnectionClosed),
        Err(err) => Err(FrameError::Io(err)),
    }
}

/// Encode `payload` with a 4-byte big-endian length prefix.
pub fn encode_length_prefixed(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(LENGTH_PREFIX_LEN + payload.len());
    dst.put_u32(len);
    dst.put_slice(payload);
    Ok(())
}
