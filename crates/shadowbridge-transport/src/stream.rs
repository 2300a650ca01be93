use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::error::{Result, TransportError};

/// A live byte-stream connection to the downstream peer.
///
/// Implements `AsyncRead + AsyncWrite` so response framers can drive it
/// directly. Once [`close`](Self::close) has run, every operation fails with
/// [`TransportError::NotConnected`].
pub struct StreamConnection {
    inner: Option<StreamInner>,
    peer: String,
}

enum StreamInner {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl StreamConnection {
    pub(crate) fn from_plain(stream: TcpStream, peer: String) -> Self {
        Self {
            inner: Some(StreamInner::Plain(stream)),
            peer,
        }
    }

    pub(crate) fn from_tls(stream: TlsStream<TcpStream>, peer: String) -> Self {
        Self {
            inner: Some(StreamInner::Tls(Box::new(stream))),
            peer,
        }
    }

    /// The `host:port` this connection was dialed to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Whether the connection has not been closed locally.
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Whether the connection is TLS-secured.
    pub fn is_tls(&self) -> bool {
        matches!(self.inner, Some(StreamInner::Tls(_)))
    }

    /// Write all of `bytes` and flush.
    ///
    /// An empty slice is a no-op write that still succeeds on an open stream.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        AsyncWriteExt::write_all(&mut *self, bytes).await?;
        AsyncWriteExt::flush(&mut *self).await?;
        Ok(())
    }

    /// Shut the connection down. Safe to call any number of times.
    pub async fn close(&mut self) {
        let Some(mut inner) = self.inner.take() else {
            return;
        };
        let result = match &mut inner {
            StreamInner::Plain(stream) => stream.shutdown().await,
            StreamInner::Tls(stream) => stream.shutdown().await,
        };
        if let Err(err) = result {
            debug!(peer = %self.peer, error = %err, "error while closing downstream connection");
        }
        debug!(peer = %self.peer, "downstream connection closed");
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "downstream connection closed")
}

impl AsyncRead for StreamConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            Some(StreamInner::Plain(stream)) => Pin::new(stream).poll_read(cx, buf),
            Some(StreamInner::Tls(stream)) => Pin::new(&mut **stream).poll_read(cx, buf),
            None => Poll::Ready(Err(not_connected())),
        }
    }
}

impl AsyncWrite for StreamConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            Some(StreamInner::Plain(stream)) => Pin::new(stream).poll_write(cx, buf),
            Some(StreamInner::Tls(stream)) => Pin::new(&mut **stream).poll_write(cx, buf),
            None => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            Some(StreamInner::Plain(stream)) => Pin::new(stream).poll_flush(cx),
            Some(StreamInner::Tls(stream)) => Pin::new(&mut **stream).poll_flush(cx),
            None => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            Some(StreamInner::Plain(stream)) => Pin::new(stream).poll_shutdown(cx),
            Some(StreamInner::Tls(stream)) => Pin::new(&mut **stream).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            Some(StreamInner::Plain(_)) => "tcp",
            Some(StreamInner::Tls(_)) => "tls",
            None => "closed",
        };
        f.debug_struct("StreamConnection")
            .field("peer", &self.peer)
            .field("type", &kind)
            .finish()
    }
}
