//! Auxiliary service injection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::mux::TlsConn;

/// A co-resident service sharing the tunnel's TLS port.
///
/// The mux hands it every handshaken connection whose ALPN did not select
/// the tunnel protocol. Implementations are injected at compile time; there
/// is no dynamic loading.
#[async_trait]
pub trait Auxiliary: Send + Sync {
    /// TLS config used to handshake connections that did not offer the
    /// tunnel protocol.
    fn tls_config(&self) -> Arc<rustls::ServerConfig>;

    /// Serves routed connections until the queue closes or `shutdown` fires.
    async fn serve(
        self: Arc<Self>,
        connections: mpsc::Receiver<TlsConn>,
        shutdown: CancellationToken,
    ) -> std::io::Result<()>;
}
