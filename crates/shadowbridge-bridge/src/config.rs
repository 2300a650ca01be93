use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shadowbridge_frame::{MliPolicy, ResponseFramer};
use shadowbridge_transport::{client_config_from_pem, DownstreamTarget, TlsIdentity};

use crate::error::{BridgeError, Result};

/// Default downstream host.
pub const DEFAULT_DOWNSTREAM_HOST: &str = "127.0.0.1";
/// Default downstream port.
pub const DEFAULT_DOWNSTREAM_PORT: u16 = 6000;

/// Bridge configuration. Immutable once handed to [`Bridge::new`](crate::Bridge::new).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Address the RPC service binds to (e.g. `0.0.0.0:50051`). Required.
    pub listen_addr: String,
    /// PEM files for the RPC server identity and the downstream TLS leg.
    pub tls: Option<TlsFiles>,
    /// Downstream host.
    pub downstream_host: String,
    /// Downstream port.
    pub downstream_port: u16,
    /// Dial the downstream peer over TLS.
    pub enable_downstream_tls: bool,
    /// TLS server name for the downstream leg. Defaults to the host.
    pub downstream_server_name: Option<String>,
    /// How downstream replies are captured.
    pub response_framing: ResponseFramer,
    /// Whether the MLI is checked against the body length.
    pub mli_policy: MliPolicy,
    /// Upper bound on one downstream write+read exchange.
    pub io_timeout_ms: Option<u64>,
    /// Upper bound on dialing the downstream peer.
    pub connect_timeout_ms: Option<u64>,
    /// Redial a failed downstream connection at the start of the next call.
    pub reconnect_on_failure: bool,
}

/// Paths to PEM-encoded TLS material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsFiles {
    /// Certificate chain: RPC server identity and downstream client identity.
    pub cert_path: PathBuf,
    /// Private key for `cert_path`.
    pub key_path: PathBuf,
    /// Trust anchors for the downstream peer. Required for downstream TLS.
    #[serde(default)]
    pub ca_path: Option<PathBuf>,
}

/// TLS material loaded from [`TlsFiles`].
#[derive(Debug, Clone)]
pub(crate) struct TlsMaterial {
    pub identity: TlsIdentity,
    pub ca_pem: Option<Vec<u8>>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: String::new(),
            tls: None,
            downstream_host: DEFAULT_DOWNSTREAM_HOST.to_string(),
            downstream_port: DEFAULT_DOWNSTREAM_PORT,
            enable_downstream_tls: false,
            downstream_server_name: None,
            response_framing: ResponseFramer::default(),
            mli_policy: MliPolicy::default(),
            io_timeout_ms: None,
            connect_timeout_ms: None,
            reconnect_on_failure: false,
        }
    }
}

impl BridgeConfig {
    /// Plain configuration: listen on `listen_addr`, forward to `host:port`.
    pub fn new(listen_addr: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            downstream_host: host.into(),
            downstream_port: port,
            ..Self::default()
        }
    }

    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| BridgeError::Config(format!("parse: {err}")))
    }

    /// Load a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            BridgeError::Config(format!("failed reading {}: {err}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Check the configuration without touching the network.
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.trim().is_empty() {
            return Err(BridgeError::Config("missing listen address".to_string()));
        }
        if self.downstream_host.trim().is_empty() {
            return Err(BridgeError::Config("missing downstream host".to_string()));
        }
        if self.downstream_port == 0 {
            return Err(BridgeError::Config("downstream port must be non-zero".to_string()));
        }
        if self.enable_downstream_tls
            && self.tls.as_ref().and_then(|tls| tls.ca_path.as_ref()).is_none()
        {
            return Err(BridgeError::Config(
                "downstream TLS requires tls.ca_path".to_string(),
            ));
        }
        match self.response_framing {
            ResponseFramer::BestEffortSingleRead { max_bytes: 0 } => {
                return Err(BridgeError::Config(
                    "response_framing.max_bytes must be non-zero".to_string(),
                ));
            }
            ResponseFramer::LengthPrefixed { max_payload: 0 } => {
                return Err(BridgeError::Config(
                    "response_framing.max_payload must be non-zero".to_string(),
                ));
            }
            _ => {}
        }
        if self.io_timeout_ms == Some(0) || self.connect_timeout_ms == Some(0) {
            return Err(BridgeError::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Read the configured TLS files, if any.
    pub(crate) fn load_tls(&self) -> Result<Option<TlsMaterial>> {
        let Some(files) = &self.tls else {
            return Ok(None);
        };
        let identity = TlsIdentity {
            cert_chain_pem: read_pem(&files.cert_path)?,
            private_key_pem: read_pem(&files.key_path)?,
        };
        let ca_pem = files.ca_path.as_deref().map(read_pem).transpose()?;
        Ok(Some(TlsMaterial { identity, ca_pem }))
    }

    /// Describe the downstream leg, building TLS client credentials if enabled.
    pub(crate) fn downstream_target(&self, tls: Option<&TlsMaterial>) -> Result<DownstreamTarget> {
        let target = DownstreamTarget::new(self.downstream_host.clone(), self.downstream_port)
            .with_connect_timeout(self.connect_timeout());
        if !self.enable_downstream_tls {
            return Ok(target);
        }

        let (identity, ca_pem) = match tls {
            Some(TlsMaterial {
                identity,
                ca_pem: Some(ca_pem),
            }) => (identity, ca_pem),
            _ => {
                return Err(BridgeError::Config(
                    "downstream TLS requires tls.ca_path".to_string(),
                ))
            }
        };
        let client_config = client_config_from_pem(ca_pem, Some(identity))
            .map_err(|err| BridgeError::Tls(err.to_string()))?;
        let server_name = self
            .downstream_server_name
            .as_deref()
            .unwrap_or(&self.downstream_host);
        target
            .with_tls(client_config, server_name)
            .map_err(|err| BridgeError::Tls(err.to_string()))
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|err| BridgeError::Config(format!("failed reading {}: {err}", path.display())))
}
