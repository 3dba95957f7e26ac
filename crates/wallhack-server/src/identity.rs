//! Client identity extraction from the peer certificate.

use rustls::pki_types::CertificateDer;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Extracts the subject common name from a peer certificate.
///
/// The common name doubles as the tenant identifier: it keys the session
/// registry and names the TUN interface paired with the client.
pub fn common_name(cert: &CertificateDer<'_>) -> Result<String, IdentityError> {
    let (_, parsed) =
        X509Certificate::from_der(cert.as_ref()).map_err(|err| IdentityError::Der(err.to_string()))?;

    let result = parsed
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
        .ok_or(IdentityError::NoCommonName);
    result
}

/// Identity error type.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("parse peer certificate: {0}")]
    Der(String),
    #[error("peer certificate subject has no common name")]
    NoCommonName,
}
