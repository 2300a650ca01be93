//! Loopback peers and log capture shared by the unit tests.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use shadowbridge_frame::{encode_envelope, encode_length_prefixed, HEADER_LEN, MLI_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;

use crate::logger::Logger;

pub(crate) const HEADER: [u8; HEADER_LEN] = *b"HDR0000001";
pub(crate) const MLI: [u8; MLI_LEN] = [0, 0, 0, 0];

/// `[HEADER][MLI][body]`.
pub(crate) fn envelope(body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_envelope(&HEADER, &MLI, body, &mut buf);
    buf.to_vec()
}

/// Peer that echoes every read back unchanged.
pub(crate) async fn spawn_echo_peer() -> SocketAddr {
    spawn_peer(|mut stream| async move {
        let mut buf = [0_u8; 4096];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if stream.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
    .await
}

/// Peer that answers every read with a length-prefixed echo.
pub(crate) async fn spawn_prefixed_echo_peer() -> SocketAddr {
    spawn_peer(|mut stream| async move {
        let mut buf = [0_u8; 4096];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let mut reply = BytesMut::new();
                    if encode_length_prefixed(&buf[..n], &mut reply).is_err()
                        || stream.write_all(&reply).await.is_err()
                    {
                        break;
                    }
                }
            }
        }
    })
    .await
}

/// Peer that reads forever and never replies.
pub(crate) async fn spawn_silent_peer() -> SocketAddr {
    spawn_peer(|mut stream| async move {
        let mut buf = [0_u8; 4096];
        while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
    })
    .await
}

/// Peer that accepts and immediately hangs up.
pub(crate) async fn spawn_hangup_peer() -> SocketAddr {
    spawn_peer(|stream| async move { drop(stream) }).await
}

pub(crate) async fn spawn_peer<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("peer should bind");
    let addr = listener.local_addr().expect("peer should have an address");
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(handler(stream));
        }
    });
    addr
}

/// In-memory log sink behind a [`Logger`].
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn logger(&self) -> Logger {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        Logger::new(Dispatch::new(subscriber))
    }

    pub(crate) fn contents(&self) -> String {
        let buf = self.buf.lock().expect("log buffer lock");
        String::from_utf8_lossy(&buf).into_owned()
    }
}

pub(crate) struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("log buffer poisoned"))?
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter(Arc::clone(&self.buf))
    }
}
