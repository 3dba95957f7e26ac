//! Wallhack tunnel server.
//!
//! Listens on supervisor-inherited sockets, routes accepted TLS connections
//! by ALPN between the tunnel and an optional auxiliary service, and runs
//! one bridging session per tunnel client, keyed by the client certificate's
//! common name.

mod auxiliary;
mod error;
mod identity;
mod mux;
mod registry;
mod session;
mod util;

pub use auxiliary::Auxiliary;
pub use error::ServerError;
pub use identity::{common_name, IdentityError};
pub use mux::{Frontends, TlsConn, TlsMux};
pub use registry::SessionRegistry;
pub use tokio_util::sync::CancellationToken;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use wallhack_core::defaults::SHUTDOWN_DRAIN;
use wallhack_service::Service;
use wallhack_transport::tls;

use util::{SessionGuard, SessionTracker};

/// Runs the server until cancelled or a listener fails.
///
/// Sessions fail on their own; only accept-loop errors and startup errors
/// (credentials, TLS config, missing listeners) surface from here.
pub async fn run_with_shutdown(
    service: &Service,
    auxiliary: Option<Arc<dyn Auxiliary>>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let credentials = service.load_credentials()?;
    let ca = credentials.ca.as_deref().ok_or(ServerError::MissingCa)?;
    let tunnel_config = Arc::new(tls::server_config(&credentials.cert, &credentials.key, ca)?);
    let auxiliary_config = auxiliary.as_ref().map(|aux| aux.tls_config());

    let backends = service
        .take_listeners()?
        .into_iter()
        .map(|listener| {
            listener.set_nonblocking(true)?;
            TcpListener::from_std(listener)
        })
        .collect::<std::io::Result<Vec<_>>>()?;

    info!(backends = backends.len(), "listening");
    service.status("listening");

    let (mux, frontends) = TlsMux::new(backends, tunnel_config, auxiliary_config);
    let mux_task = tokio::spawn(mux.run(shutdown.child_token()));

    let auxiliary_task = auxiliary.map(|aux| {
        let connections = frontends.auxiliary;
        let token = shutdown.child_token();
        tokio::spawn(async move { aux.serve(connections, token).await })
    });

    let registry = Arc::new(SessionRegistry::new());
    let tracker = SessionTracker::new();

    let mut tunnel = frontends.tunnel;
    while let Some(conn) = tunnel.recv().await {
        let registry = registry.clone();
        let token = shutdown.child_token();
        let guard = SessionGuard::new(tracker.clone());
        tokio::spawn(async move {
            let _guard = guard;
            session::run(conn, registry, token).await;
        });
    }

    // The tunnel frontend only closes once the mux stopped, by shutdown or
    // by a listener failure.
    let result = mux_task.await?;

    let active = tracker.count();
    if active > 0 {
        info!(active, "waiting for sessions to drain");
        if !tracker.wait_for_zero(SHUTDOWN_DRAIN).await {
            warn!(active = tracker.count(), "shutdown drain elapsed with sessions still active");
        }
    }

    if let Some(task) = auxiliary_task {
        match tokio::time::timeout(SHUTDOWN_DRAIN, task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => warn!(error = %err, "auxiliary service failed"),
            Ok(Err(err)) => warn!(error = %err, "auxiliary task failed"),
            Err(_) => warn!("auxiliary service did not stop within the drain window"),
        }
    }

    info!("server stopped");
    result
}
