//! Client error types.

use wallhack_service::ServiceError;
use wallhack_transport::TransportError;

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("config: {0}")]
    Config(String),
    #[error("service: {0}")]
    Service(#[from] ServiceError),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
