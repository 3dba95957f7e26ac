//! Server error types.

use wallhack_service::ServiceError;
use wallhack_transport::TransportError;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("service: {0}")]
    Service(#[from] ServiceError),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("server credentials carry no ca certificate")]
    MissingCa,
    #[error("task: {0}")]
    Join(#[from] tokio::task::JoinError),
}
