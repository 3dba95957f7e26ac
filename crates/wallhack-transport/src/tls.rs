//! TLS configuration for both ends of the tunnel.
//!
//! Both sides speak TLS 1.3 only and negotiate the tunnel protocol via ALPN.
//! The server requires and verifies a client certificate against the CA from
//! its credentials; the client presents its own certificate and validates
//! the server against the credential CA when present, falling back to the
//! webpki root set otherwise.

use std::io::Cursor;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use tracing::info;
use wallhack_core::defaults::ALPN_TUNNEL;

use crate::error::TransportError;

/// Builds the server-side TLS config for the tunnel frontend.
///
/// TLS 1.3 only, client certificate required and verified against `ca_pem`,
/// ALPN restricted to the tunnel protocol.
pub fn server_config(
    cert_pem: &str,
    key_pem: &str,
    ca_pem: &str,
) -> Result<rustls::ServerConfig, TransportError> {
    let certs = parse_certs(cert_pem)?;
    let key = parse_key(key_pem)?;

    let verifier = WebPkiClientVerifier::builder(Arc::new(root_store(ca_pem)?)).build()?;

    let mut config = rustls::ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![ALPN_TUNNEL.to_vec()];

    info!("tunnel tls configured: tls 1.3, mutual auth, alpn wallhack");

    Ok(config)
}

/// Builds the client-side TLS config for dialing a tunnel server.
pub fn client_config(
    cert_pem: &str,
    key_pem: &str,
    ca_pem: Option<&str>,
) -> Result<rustls::ClientConfig, TransportError> {
    let certs = parse_certs(cert_pem)?;
    let key = parse_key(key_pem)?;

    let roots = match ca_pem {
        Some(pem) => root_store(pem)?,
        None => {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            roots
        }
    };

    let mut config = rustls::ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)?;
    config.alpn_protocols = vec![ALPN_TUNNEL.to_vec()];

    Ok(config)
}

/// Parses every certificate in a PEM string.
fn parse_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut Cursor::new(pem))
        .collect::<Result<_, _>>()
        .map_err(|err| TransportError::Pem(format!("certificate: {err}")))?;
    if certs.is_empty() {
        return Err(TransportError::Pem("no certificate found".into()));
    }
    Ok(certs)
}

/// Parses the first private key in a PEM string.
fn parse_key(pem: &str) -> Result<PrivateKeyDer<'static>, TransportError> {
    rustls_pemfile::private_key(&mut Cursor::new(pem))
        .map_err(|err| TransportError::Pem(format!("private key: {err}")))?
        .ok_or_else(|| TransportError::Pem("no private key found".into()))
}

/// Builds a root store from every certificate in a PEM string.
fn root_store(pem: &str) -> Result<RootCertStore, TransportError> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certs(pem)? {
        roots
            .add(cert)
            .map_err(|err| TransportError::Pem(format!("ca certificate: {err}")))?;
    }
    Ok(roots)
}
