use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::StreamConnection;
use crate::tls::server_name;

/// Where and how to dial the downstream peer.
///
/// Dialing is never retried here; the caller decides what a failed dial means.
#[derive(Clone)]
pub struct DownstreamTarget {
    host: String,
    port: u16,
    tls: Option<TlsLeg>,
    connect_timeout: Option<Duration>,
}

#[derive(Clone)]
struct TlsLeg {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl DownstreamTarget {
    /// A plain TCP target.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: None,
            connect_timeout: None,
        }
    }

    /// Secure the connection with TLS, verifying the peer as `name`.
    pub fn with_tls(mut self, config: Arc<ClientConfig>, name: &str) -> Result<Self> {
        self.tls = Some(TlsLeg {
            connector: TlsConnector::from(config),
            server_name: server_name(name)?,
        });
        Ok(self)
    }

    /// Bound the TCP connect plus TLS handshake.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn uses_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Open a new connection to the target.
    pub async fn dial(&self) -> Result<StreamConnection> {
        let addr = self.address();
        match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, self.dial_inner(&addr))
                .await
                .map_err(|_| TransportError::Connect {
                    addr: addr.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("connect timed out after {limit:?}"),
                    ),
                })?,
            None => self.dial_inner(&addr).await,
        }
    }

    async fn dial_inner(&self, addr: &str) -> Result<StreamConnection> {
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        if let Err(err) = tcp.set_nodelay(true) {
            debug!(%addr, error = %err, "failed to set TCP_NODELAY");
        }

        let Some(leg) = &self.tls else {
            info!(%addr, "tcp connection established");
            return Ok(StreamConnection::from_plain(tcp, addr.to_string()));
        };

        let stream = leg
            .connector
            .connect(leg.server_name.clone(), tcp)
            .await
            .map_err(|source| TransportError::Handshake {
                addr: addr.to_string(),
                source,
            })?;
        info!(%addr, "tls connection established");
        Ok(StreamConnection::from_tls(stream, addr.to_string()))
    }
}

impl std::fmt::Debug for DownstreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownstreamTarget")
            .field("address", &self.address())
            .field("tls", &self.uses_tls())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
