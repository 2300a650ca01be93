use std::time::Duration;

use bytes::Bytes;
use shadowbridge_frame::ResponseFramer;
use shadowbridge_transport::{DownstreamTarget, StreamConnection};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};

/// The single downstream connection, shared by every in-flight call.
///
/// A call holds the lock for its whole write+read exchange, so replies can
/// never be attributed to the wrong caller. An exchange that fails, times
/// out or is abandoned leaves the connection poisoned: the next call either
/// redials once (`reconnect = true`) or fails with
/// [`BridgeError::DownstreamUnavailable`].
pub struct SerializedStreamChannel {
    target: DownstreamTarget,
    reconnect: bool,
    state: Mutex<ChannelState>,
    closing: CancellationToken,
}

#[derive(Default)]
struct ChannelState {
    conn: Option<StreamConnection>,
    poisoned: bool,
}

impl ChannelState {
    fn usable(&self) -> bool {
        !self.poisoned && self.conn.as_ref().is_some_and(StreamConnection::is_open)
    }
}

impl SerializedStreamChannel {
    /// A channel to `target`. Nothing is dialed until [`connect`](Self::connect).
    pub fn new(target: DownstreamTarget, reconnect: bool) -> Self {
        Self {
            target,
            reconnect,
            state: Mutex::new(ChannelState::default()),
            closing: CancellationToken::new(),
        }
    }

    pub fn target(&self) -> &DownstreamTarget {
        &self.target
    }

    /// Dial the downstream peer, replacing any existing connection.
    pub async fn connect(&self) -> Result<()> {
        let conn = self.target.dial().await.map_err(BridgeError::Connect)?;
        let mut state = self.state.lock().await;
        if let Some(mut old) = state.conn.replace(conn) {
            old.close().await;
        }
        state.poisoned = false;
        Ok(())
    }

    /// Whether the next exchange can run on the current connection.
    pub async fn is_healthy(&self) -> bool {
        self.state.lock().await.usable()
    }

    /// Write `body` and capture one reply with `framer`.
    ///
    /// `timeout` bounds any redial plus the exchange, not the wait for the lock.
    pub async fn round_trip(
        &self,
        body: &[u8],
        framer: &ResponseFramer,
        timeout: Option<Duration>,
    ) -> Result<Bytes> {
        let mut state = tokio::select! {
            _ = self.closing.cancelled() => return Err(shutting_down()),
            state = self.state.lock() => state,
        };
        if self.closing.is_cancelled() {
            return Err(shutting_down());
        }

        let state = &mut *state;
        let work = async {
            if !state.usable() {
                self.recover(state).await?;
            }
            // Cleared only when the exchange completes; a dropped future leaves it set.
            state.poisoned = true;
            let conn = state.conn.as_mut().ok_or_else(|| {
                BridgeError::DownstreamUnavailable("no downstream connection".to_string())
            })?;
            exchange(conn, body, framer).await
        };
        let result = tokio::select! {
            _ = self.closing.cancelled() => Err(shutting_down()),
            result = with_timeout(work, timeout) => result,
        };

        match &result {
            Ok(reply) => {
                state.poisoned = false;
                debug!(reply_len = reply.len(), "downstream exchange complete");
            }
            Err(err) => {
                warn!(error = %err, "downstream exchange failed; connection poisoned");
                if let Some(mut conn) = state.conn.take() {
                    conn.close().await;
                }
            }
        }
        result
    }

    /// Close the connection. Wakes any call waiting on it; idempotent.
    pub async fn close(&self) {
        self.closing.cancel();
        let mut state = self.state.lock().await;
        if let Some(mut conn) = state.conn.take() {
            conn.close().await;
            info!(peer = %conn.peer(), "downstream connection closed");
        }
    }

    async fn recover(&self, state: &mut ChannelState) -> Result<()> {
        if !self.reconnect {
            return Err(BridgeError::DownstreamUnavailable(
                "connection unusable after an earlier failure".to_string(),
            ));
        }
        if let Some(mut old) = state.conn.take() {
            old.close().await;
        }
        info!(peer = %self.target.address(), "redialing downstream");
        let conn = self.target.dial().await.map_err(|err| {
            BridgeError::DownstreamUnavailable(format!("reconnect failed: {err}"))
        })?;
        info!(peer = %conn.peer(), "downstream redialed");
        state.conn = Some(conn);
        state.poisoned = false;
        Ok(())
    }
}

impl std::fmt::Debug for SerializedStreamChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializedStreamChannel")
            .field("target", &self.target)
            .field("reconnect", &self.reconnect)
            .finish_non_exhaustive()
    }
}

async fn exchange(
    conn: &mut StreamConnection,
    body: &[u8],
    framer: &ResponseFramer,
) -> Result<Bytes> {
    conn.write(body).await.map_err(BridgeError::DownstreamWrite)?;
    framer
        .read_response(conn)
        .await
        .map_err(BridgeError::DownstreamRead)
}

async fn with_timeout<F>(future: F, timeout: Option<Duration>) -> Result<Bytes>
where
    F: std::future::Future<Output = Result<Bytes>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .unwrap_or(Err(BridgeError::DownstreamTimeout(limit))),
        None => future.await,
    }
}

fn shutting_down() -> BridgeError {
    BridgeError::DownstreamUnavailable("bridge is shutting down".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use shadowbridge_frame::FrameError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::test_support::{
        spawn_echo_peer, spawn_hangup_peer, spawn_peer, spawn_prefixed_echo_peer,
        spawn_silent_peer,
    };

    fn target(addr: std::net::SocketAddr) -> DownstreamTarget {
        DownstreamTarget::new(addr.ip().to_string(), addr.port())
    }

    async fn connected(addr: std::net::SocketAddr, reconnect: bool) -> SerializedStreamChannel {
        let channel = SerializedStreamChannel::new(target(addr), reconnect);
        channel.connect().await.expect("channel should connect");
        channel
    }

    #[tokio::test]
    async fn round_trip_echoes_body() {
        let channel = connected(spawn_echo_peer().await, false).await;
        assert!(channel.is_healthy().await);

        let reply = channel
            .round_trip(b"ping", &ResponseFramer::default(), None)
            .await
            .expect("round trip should succeed");
        assert_eq!(&reply[..], b"ping");
    }

    #[tokio::test]
    async fn length_prefixed_reply_is_unwrapped() {
        let channel = connected(spawn_prefixed_echo_peer().await, false).await;
        let reply = channel
            .round_trip(b"framed", &ResponseFramer::length_prefixed(), None)
            .await
            .expect("round trip should succeed");
        assert_eq!(&reply[..], b"framed");
    }

    #[tokio::test]
    async fn concurrent_calls_get_their_own_replies() {
        let channel = Arc::new(connected(spawn_prefixed_echo_peer().await, false).await);
        let framer = ResponseFramer::length_prefixed();

        let mut tasks = Vec::new();
        for i in 0..32 {
            let channel = Arc::clone(&channel);
            tasks.push(tokio::spawn(async move {
                let body = format!("call-{i:02}");
                let reply = channel
                    .round_trip(body.as_bytes(), &framer, Some(Duration::from_secs(5)))
                    .await
                    .expect("round trip should succeed");
                assert_eq!(&reply[..], body.as_bytes());
            }));
        }
        for task in tasks {
            task.await.expect("task should not panic");
        }
    }

    #[tokio::test]
    async fn timeout_poisons_connection_without_reconnect() {
        let channel = connected(spawn_silent_peer().await, false).await;

        let err = channel
            .round_trip(b"hello", &ResponseFramer::default(), Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::DownstreamTimeout(_)));
        assert!(!channel.is_healthy().await);

        let err = channel
            .round_trip(b"again", &ResponseFramer::default(), Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::DownstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn peer_close_is_read_or_write_error() {
        let channel = connected(spawn_hangup_peer().await, false).await;

        let err = channel
            .round_trip(b"x", &ResponseFramer::default(), Some(Duration::from_secs(2)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::DownstreamRead(FrameError::ConnectionClosed)
                | BridgeError::DownstreamRead(FrameError::Io(_))
                | BridgeError::DownstreamWrite(_)
        ));
        assert!(!channel.is_healthy().await);
    }

    #[tokio::test]
    async fn reconnect_redials_after_failure() {
        // First connection hangs up; every later one echoes.
        let accepted = Arc::new(AtomicUsize::new(0));
        let addr = {
            let accepted = Arc::clone(&accepted);
            spawn_peer(move |mut stream| {
                let first = accepted.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if first {
                        return;
                    }
                    let mut buf = [0_u8; 1024];
                    while let Ok(n) = stream.read(&mut buf).await {
                        if n == 0 || stream.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            })
            .await
        };
        let channel = connected(addr, true).await;

        let first = channel
            .round_trip(b"lost", &ResponseFramer::default(), Some(Duration::from_secs(2)))
            .await;
        assert!(first.is_err());

        let reply = channel
            .round_trip(b"recovered", &ResponseFramer::default(), Some(Duration::from_secs(2)))
            .await
            .expect("second call should redial");
        assert_eq!(&reply[..], b"recovered");
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reconnect_dials_on_demand() {
        let channel = SerializedStreamChannel::new(target(spawn_echo_peer().await), true);
        assert!(!channel.is_healthy().await);

        let reply = channel
            .round_trip(b"fresh", &ResponseFramer::default(), None)
            .await
            .expect("first call should dial on demand");
        assert_eq!(&reply[..], b"fresh");
    }

    #[tokio::test]
    async fn abandoned_exchange_poisons_connection() {
        let channel = Arc::new(connected(spawn_silent_peer().await, false).await);

        let pending = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                channel
                    .round_trip(b"never answered", &ResponseFramer::default(), None)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        pending.abort();
        let _ = pending.await;

        assert!(!channel.is_healthy().await);
        let err = channel
            .round_trip(b"next", &ResponseFramer::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::DownstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn close_wakes_blocked_call_and_rejects_new_ones() {
        let channel = Arc::new(connected(spawn_silent_peer().await, false).await);

        let pending = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                channel
                    .round_trip(b"stuck", &ResponseFramer::default(), None)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        channel.close().await;
        channel.close().await;

        let err = pending
            .await
            .expect("task should not panic")
            .unwrap_err();
        assert!(matches!(err, BridgeError::DownstreamUnavailable(_)));

        let err = channel
            .round_trip(b"late", &ResponseFramer::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::DownstreamUnavailable(_)));
    }

    /// TLS target whose peer accepts TCP but never answers the handshake.
    async fn stalled_tls_target() -> DownstreamTarget {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("certificate should generate");
        let client_config =
            shadowbridge_transport::client_config_from_pem(certified.cert.pem().as_bytes(), None)
                .expect("client config should build");
        target(spawn_silent_peer().await)
            .with_tls(client_config, "localhost")
            .expect("server name should be valid")
    }

    #[tokio::test]
    async fn redial_is_bounded_by_call_timeout() {
        let channel = SerializedStreamChannel::new(stalled_tls_target().await, true);

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            channel.round_trip(b"x", &ResponseFramer::default(), Some(Duration::from_millis(100))),
        )
        .await
        .expect("call should give up at its own deadline");
        let err = result.unwrap_err();
        assert!(matches!(err, BridgeError::DownstreamTimeout(d) if d == Duration::from_millis(100)));
        assert!(!channel.is_healthy().await);
    }

    #[tokio::test]
    async fn close_interrupts_stalled_redial() {
        let channel = Arc::new(SerializedStreamChannel::new(stalled_tls_target().await, true));

        let pending = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                channel
                    .round_trip(b"x", &ResponseFramer::default(), None)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(2), channel.close())
            .await
            .expect("close should not wait on the redial");
        let err = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .expect("pending call should finish")
            .expect("task should not panic")
            .unwrap_err();
        assert!(matches!(err, BridgeError::DownstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn connect_failure_is_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have an address");
        drop(listener);

        let channel = SerializedStreamChannel::new(target(addr), false);
        let err = channel.connect().await.unwrap_err();
        assert!(matches!(err, BridgeError::Connect(_)));
    }
}
