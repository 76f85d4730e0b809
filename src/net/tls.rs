//! TLS configuration and certificate loading.
//!
//! # Design Decisions
//! - Client certificates are mandatory and verified against a dedicated CA bundle
//! - ALPN offers h2 and http/1.1; the HTTP layer serves whichever is negotiated
//! - The ring provider is selected explicitly so no process-wide default is needed

use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("could not read {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("no certificates found in {0}")]
    NoCertificates(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("invalid client CA bundle: {0}")]
    ClientCa(String),

    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// Verified peer chain of the connection a request arrived on, leaf first.
#[derive(Debug, Clone)]
pub struct PeerCertificates(Arc<[CertificateDer<'static>]>);

impl PeerCertificates {
    pub fn new(chain: Vec<CertificateDer<'static>>) -> Self {
        Self(chain.into())
    }

    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.0
    }
}

/// Build the listener's mTLS configuration from PEM files.
pub fn build_server_config(
    cert_path: &Path,
    key_path: &Path,
    client_ca_path: &Path,
) -> Result<Arc<ServerConfig>, TlsError> {
    let cert_pem = read(cert_path)?;
    let key_pem = read(key_path)?;
    let ca_pem = read(client_ca_path)?;

    let certs = parse_certs(&cert_pem, cert_path)?;
    let key = parse_private_key(&key_pem, key_path)?;
    let roots = parse_certs(&ca_pem, client_ca_path)?;

    let config = server_config(certs, key, roots)?;
    tracing::info!(
        cert = %cert_path.display(),
        client_ca = %client_ca_path.display(),
        "TLS configuration loaded"
    );
    Ok(config)
}

/// Build an mTLS server configuration from already-parsed material.
pub fn server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    client_roots: Vec<CertificateDer<'static>>,
) -> Result<Arc<ServerConfig>, TlsError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = RootCertStore::empty();
    for root in client_roots {
        roots.add(root).map_err(|e| TlsError::ClientCa(e.to_string()))?;
    }

    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
        .build()
        .map_err(|e| TlsError::ClientCa(e.to_string()))?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parse_certs(pem: &[u8], path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

fn parse_private_key(pem: &[u8], path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut BufReader::new(pem))
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, KeyPair};

    fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn builds_config_from_pem_files() {
        let dir = tempfile::tempdir().unwrap();

        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .signed_by(&key, &ca, &ca_key)
            .unwrap();

        let cert_path = write(dir.path(), "server.pem", &cert.pem());
        let key_path = write(dir.path(), "server.key", &key.serialize_pem());
        let ca_path = write(dir.path(), "ca.pem", &ca.pem());

        let config = build_server_config(&cert_path, &key_path, &ca_path).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
    }

    #[test]
    fn missing_or_empty_material_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let empty = write(dir.path(), "empty.pem", "");
        let missing = dir.path().join("missing.pem");

        assert!(matches!(
            build_server_config(&missing, &empty, &empty),
            Err(TlsError::Io { .. })
        ));
        assert!(matches!(
            parse_certs(b"", &empty),
            Err(TlsError::NoCertificates(_))
        ));
        assert!(matches!(
            parse_private_key(b"", &empty),
            Err(TlsError::NoPrivateKey(_))
        ));
    }
}
