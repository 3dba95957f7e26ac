//! Transport error types.

use crate::tun::IFACE_NAME_MAX;

/// Transport error type.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("tun name longer than {IFACE_NAME_MAX} bytes: {0}")]
    IfaceName(usize),
    #[error("attach tun device: {0}")]
    TunAttach(#[source] std::io::Error),
    #[error("bad pem in credentials: {0}")]
    Pem(String),
    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),
    #[error("client verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
