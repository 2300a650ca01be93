use std::io::{BufReader, Cursor};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};

use crate::error::{Result, TransportError};

/// PEM-encoded certificate chain and private key presented to the peer.
#[derive(Clone)]
pub struct TlsIdentity {
    pub cert_chain_pem: Vec<u8>,
    pub private_key_pem: Vec<u8>,
}

impl std::fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("cert_chain_pem", &format_args!("{} bytes", self.cert_chain_pem.len()))
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

/// Build a rustls client config trusting the certificates in `ca_pem`.
///
/// When `identity` is given it is presented as the client certificate.
/// The ring provider is selected explicitly so the config never depends on
/// a process-wide default provider.
pub fn client_config_from_pem(
    ca_pem: &[u8],
    identity: Option<&TlsIdentity>,
) -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    let ca_certs = load_certs(ca_pem)?;
    if ca_certs.is_empty() {
        return Err(TransportError::Tls("no CA certificates found".to_string()));
    }
    for cert in ca_certs {
        roots
            .add(cert)
            .map_err(|err| TransportError::Tls(format!("add root cert: {err}")))?;
    }

    let builder =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|err| TransportError::Tls(format!("protocol versions: {err}")))?
            .with_root_certificates(roots);

    let config = match identity {
        Some(identity) => {
            let chain = load_certs(&identity.cert_chain_pem)?;
            let key = load_private_key(&identity.private_key_pem)?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|err| TransportError::Tls(format!("client identity: {err}")))?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(Arc::new(config))
}

pub(crate) fn load_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(Cursor::new(pem));
    rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|err| TransportError::Tls(format!("parse certificate: {err}")))
}

pub(crate) fn load_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(Cursor::new(pem));
    rustls_pemfile::private_key(&mut reader)
        .map_err(|err| TransportError::Tls(format!("parse private key: {err}")))?
        .ok_or_else(|| TransportError::Tls("no private key found".to_string()))
}

pub(crate) fn server_name(name: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(name.to_string())
        .map_err(|_| TransportError::InvalidServerName(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed() -> rcgen::CertifiedKey {
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("certificate should generate")
    }

    #[test]
    fn builds_config_from_ca() {
        let ca = self_signed();
        let config = client_config_from_pem(ca.cert.pem().as_bytes(), None);
        assert!(config.is_ok());
    }

    #[test]
    fn builds_config_with_client_identity() {
        let ca = self_signed();
        let client = self_signed();
        let identity = TlsIdentity {
            cert_chain_pem: client.cert.pem().into_bytes(),
            private_key_pem: client.key_pair.serialize_pem().into_bytes(),
        };
        let config = client_config_from_pem(ca.cert.pem().as_bytes(), Some(&identity))
            .expect("config with identity should build");
        assert!(config.client_auth_cert_resolver.has_certs());
    }

    #[test]
    fn rejects_empty_ca_bundle() {
        let result = client_config_from_pem(b"", None);
        assert!(matches!(result, Err(TransportError::Tls(_))));
    }

    #[test]
    fn rejects_identity_without_key() {
        let ca = self_signed();
        let identity = TlsIdentity {
            cert_chain_pem: ca.cert.pem().into_bytes(),
            private_key_pem: b"not a key".to_vec(),
        };
        let result = client_config_from_pem(ca.cert.pem().as_bytes(), Some(&identity));
        assert!(matches!(result, Err(TransportError::Tls(_))));
    }

    #[test]
    fn server_name_accepts_dns_and_ip() {
        assert!(server_name("localhost").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(matches!(
            server_name("not a host name"),
            Err(TransportError::InvalidServerName(_))
        ));
    }
}
