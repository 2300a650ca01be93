use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::server::Router;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tracing::{info, warn};

use crate::channel::SerializedStreamChannel;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::logger::Logger;
use crate::proto::TasksServer;
use crate::service::{BridgeService, CallHandler};

/// Lifecycle phase of a [`Bridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgePhase {
    /// Built and wired, not yet serving.
    Constructed,
    /// `start()` is running the RPC server.
    Serving,
    /// Shut down. Terminal.
    Stopped,
}

impl std::fmt::Display for BridgePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Constructed => "constructed",
            Self::Serving => "serving",
            Self::Stopped => "stopped",
        })
    }
}

/// Resources handed from construction to `start()`.
struct Lifecycle {
    phase: BridgePhase,
    listener: Option<TcpListener>,
    router: Option<Router>,
}

/// Accepts `Tasks/Call` RPCs and forwards each body over one persistent
/// downstream connection.
///
/// ```text
/// Constructed ──start()──▶ Serving ──server exits──▶ Stopped
///      │                      │                        ▲
///      └──────shutdown()──────┴──────shutdown()────────┘
/// ```
pub struct Bridge {
    logger: Logger,
    local_addr: SocketAddr,
    handler: Arc<CallHandler>,
    channel: Arc<SerializedStreamChannel>,
    shutdown: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl Bridge {
    /// Validate `config`, bind the RPC listener, build the server, register
    /// the call handler and dial the downstream peer, in that order.
    ///
    /// Any failure releases everything acquired so far; no half-built
    /// bridge is returned.
    pub async fn new(config: BridgeConfig, logger: Logger) -> Result<Self> {
        logger.instrument(Self::build(config, logger.clone())).await
    }

    async fn build(config: BridgeConfig, logger: Logger) -> Result<Self> {
        config.validate()?;
        let tls = config.load_tls()?;

        let bind_addr = bind_address(&config.listen_addr);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| BridgeError::Listen {
                addr: bind_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| BridgeError::Listen {
            addr: bind_addr.clone(),
            source,
        })?;
        info!(%local_addr, tls = tls.is_some(), "rpc listener bound");

        let mut server = Server::builder();
        if let Some(material) = &tls {
            let identity = Identity::from_pem(
                &material.identity.cert_chain_pem,
                &material.identity.private_key_pem,
            );
            server = server
                .tls_config(ServerTlsConfig::new().identity(identity))
                .map_err(|err| BridgeError::Tls(err.to_string()))?;
        }

        let target = config.downstream_target(tls.as_ref())?;
        let channel = Arc::new(SerializedStreamChannel::new(
            target,
            config.reconnect_on_failure,
        ));
        let handler = Arc::new(CallHandler::new(
            Arc::clone(&channel),
            config.response_framing,
            config.mli_policy,
            config.io_timeout(),
        ));
        let router = server.add_service(TasksServer::new(BridgeService::new(
            Arc::clone(&handler),
            logger.clone(),
        )));

        channel.connect().await?;
        info!(
            downstream = %channel.target().address(),
            downstream_tls = channel.target().uses_tls(),
            framing = config.response_framing.name(),
            "bridge constructed"
        );

        Ok(Self {
            logger,
            local_addr,
            handler,
            channel,
            shutdown: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle {
                phase: BridgePhase::Constructed,
                listener: Some(listener),
                router: Some(router),
            }),
        })
    }

    /// Serve RPCs until [`shutdown`](Self::shutdown) is called or the server
    /// fails. Always leaves the bridge `Stopped`.
    pub async fn start(&self) -> Result<()> {
        let (listener, router) = {
            let mut lifecycle = self.lock_lifecycle();
            if lifecycle.phase != BridgePhase::Constructed {
                return Err(BridgeError::InvalidState(lifecycle.phase));
            }
            let (Some(listener), Some(router)) =
                (lifecycle.listener.take(), lifecycle.router.take())
            else {
                return Err(BridgeError::InvalidState(lifecycle.phase));
            };
            lifecycle.phase = BridgePhase::Serving;
            (listener, router)
        };

        let served = self
            .logger
            .instrument(async {
                info!(local_addr = %self.local_addr, "serving");
                let result = router
                    .serve_with_incoming_shutdown(
                        TcpListenerStream::new(listener),
                        self.shutdown.cancelled(),
                    )
                    .await;
                if let Err(err) = &result {
                    warn!(error = %err, "rpc server exited with error");
                }
                result
            })
            .await;

        self.shutdown().await;
        served.map_err(BridgeError::from)
    }

    /// Stop serving, release the listener and close the downstream
    /// connection. Safe from any phase and any number of times.
    pub async fn shutdown(&self) {
        let previous = {
            let mut lifecycle = self.lock_lifecycle();
            let previous = lifecycle.phase;
            lifecycle.phase = BridgePhase::Stopped;
            lifecycle.listener = None;
            lifecycle.router = None;
            previous
        };
        self.shutdown.cancel();

        self.logger
            .instrument(async {
                self.channel.close().await;
                if previous != BridgePhase::Stopped {
                    info!(from = %previous, "bridge stopped");
                }
            })
            .await;
    }

    /// Run one call through the framing contract outside the RPC server.
    pub async fn handle_call(&self, payload: &[u8]) -> Result<Bytes> {
        self.logger
            .instrument(self.handler.handle_call(payload, None))
            .await
    }

    /// Address the RPC listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn phase(&self) -> BridgePhase {
        self.lock_lifecycle().phase
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("local_addr", &self.local_addr)
            .field("phase", &self.phase())
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// `:50051` binds every interface.
fn bind_address(listen_addr: &str) -> String {
    let trimmed = listen_addr.trim();
    if trimmed.starts_with(':') {
        format!("0.0.0.0{trimmed}")
    } else {
        trimmed.to_string()
    }
}
