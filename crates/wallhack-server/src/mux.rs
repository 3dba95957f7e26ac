//! ALPN-routing TLS mux.
//!
//! The supervisor may hand the process several listening sockets, and one
//! TLS port carries two protocols told apart by ALPN: the tunnel protocol
//! and, optionally, whatever an auxiliary service speaks. The mux accepts on
//! every backend listener, picks the TLS config from the client hello,
//! completes the handshake and delivers each connection to exactly one
//! frontend queue. Connections only ever reach a frontend after a
//! successful handshake.

use std::sync::Arc;

use rustls::ServerConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_rustls::LazyConfigAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use wallhack_core::defaults::{ALPN_TUNNEL, FRONTEND_BACKLOG};

use crate::error::ServerError;

/// A handshaken inbound TLS connection.
pub type TlsConn = tokio_rustls::server::TlsStream<TcpStream>;

/// The two queues of routed connections the mux feeds.
pub struct Frontends {
    /// Connections that negotiated the tunnel protocol.
    pub tunnel: mpsc::Receiver<TlsConn>,
    /// Connections for the auxiliary service. Stays empty without one.
    pub auxiliary: mpsc::Receiver<TlsConn>,
}

/// Routes inbound TLS connections from a set of backend listeners to the
/// tunnel and auxiliary frontends.
pub struct TlsMux {
    backends: Vec<TcpListener>,
    tunnel_config: Arc<ServerConfig>,
    auxiliary_config: Option<Arc<ServerConfig>>,
    tunnel_tx: mpsc::Sender<TlsConn>,
    auxiliary_tx: mpsc::Sender<TlsConn>,
}

impl TlsMux {
    /// Creates a mux over `backends` and returns it with its frontends.
    pub fn new(
        backends: Vec<TcpListener>,
        tunnel_config: Arc<ServerConfig>,
        auxiliary_config: Option<Arc<ServerConfig>>,
    ) -> (Self, Frontends) {
        let (tunnel_tx, tunnel_rx) = mpsc::channel(FRONTEND_BACKLOG);
        let (auxiliary_tx, auxiliary_rx) = mpsc::channel(FRONTEND_BACKLOG);
        (
            Self {
                backends,
                tunnel_config,
                auxiliary_config,
                tunnel_tx,
                auxiliary_tx,
            },
            Frontends {
                tunnel: tunnel_rx,
                auxiliary: auxiliary_rx,
            },
        )
    }

    /// Accepts until cancelled or a listener fails.
    ///
    /// Per-connection handshake failures are logged and swallowed; an accept
    /// error on any backend stops the whole mux and is returned. Either way
    /// both frontend queues close when this returns, which is the shutdown
    /// signal for their consumers.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let local = shutdown.child_token();
        let mut backends = JoinSet::new();

        for backend in self.backends {
            let router = Router {
                tunnel_config: self.tunnel_config.clone(),
                auxiliary_config: self.auxiliary_config.clone(),
                tunnel_tx: self.tunnel_tx.clone(),
                auxiliary_tx: self.auxiliary_tx.clone(),
            };
            backends.spawn(accept_backend(backend, router, local.clone()));
        }
        // The tasks hold the only remaining senders; when they finish the
        // frontends close.
        drop(self.tunnel_tx);
        drop(self.auxiliary_tx);

        let mut result = Ok(());
        while let Some(joined) = backends.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    local.cancel();
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
                Err(err) => {
                    local.cancel();
                    if result.is_ok() {
                        result = Err(err.into());
                    }
                }
            }
        }
        result
    }
}

struct Router {
    tunnel_config: Arc<ServerConfig>,
    auxiliary_config: Option<Arc<ServerConfig>>,
    tunnel_tx: mpsc::Sender<TlsConn>,
    auxiliary_tx: mpsc::Sender<TlsConn>,
}

async fn accept_backend(
    backend: TcpListener,
    router: Router,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    loop {
        let (tcp, peer) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = backend.accept() => accepted?,
        };

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = router.route(tcp) => {
                if let Err(err) = result {
                    warn!(peer = %peer, error = %err, "tls handshake");
                }
            }
        }
    }
}

impl Router {
    /// Handshakes one accepted connection and delivers it to its frontend.
    async fn route(&self, tcp: TcpStream) -> std::io::Result<()> {
        let start = LazyConfigAcceptor::new(rustls::server::Acceptor::default(), tcp).await?;

        let hello = start.client_hello();
        let offers_tunnel = hello
            .alpn()
            .map(|mut protos| protos.any(|proto| proto == ALPN_TUNNEL))
            .unwrap_or(false);

        let config = if offers_tunnel {
            self.tunnel_config.clone()
        } else if let Some(auxiliary) = &self.auxiliary_config {
            auxiliary.clone()
        } else {
            // No auxiliary service and no tunnel offer: nothing here can
            // serve this client.
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "client offered no supported alpn protocol",
            ));
        };

        let conn = start.into_stream(config).await?;

        let (_, session) = conn.get_ref();
        if session.alpn_protocol() == Some(ALPN_TUNNEL) {
            if session.protocol_version() != Some(rustls::ProtocolVersion::TLSv1_3)
                || session.peer_certificates().is_none()
            {
                // The tunnel config forbids both; reaching this is a bug.
                error!("tunnel tls config violated its contract, dropping connection");
                return Ok(());
            }
            debug!("routing connection to tunnel frontend");
            let _ = self.tunnel_tx.send(conn).await;
        } else if self.auxiliary_config.is_some() {
            debug!("routing connection to auxiliary frontend");
            let _ = self.auxiliary_tx.send(conn).await;
        } else {
            // Unreachable by construction: without an auxiliary config the
            // handshake above only succeeds with the tunnel protocol.
            error!("non-tunnel protocol negotiated without auxiliary service");
        }

        Ok(())
    }
}
