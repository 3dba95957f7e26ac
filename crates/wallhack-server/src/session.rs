//! Per-connection server session.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use wallhack_core::bridge;
use wallhack_transport::{StreamEndpoint, TunDevice, TunEndpoint};

use crate::identity;
use crate::mux::TlsConn;
use crate::registry::SessionRegistry;

/// Runs one tunnel session on a handshaken connection.
///
/// The peer's certificate common name picks the TUN interface to bridge
/// with and keys the registry entry that lets a newer session for the same
/// identity displace this one. Every failure in here ends this session only;
/// the accept loop never sees it.
pub(crate) async fn run(conn: TlsConn, registry: Arc<SessionRegistry>, shutdown: CancellationToken) {
    let peer = conn
        .get_ref()
        .0
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".into());

    let (_, state) = conn.get_ref();
    let certs = state.peer_certificates().unwrap_or_default();
    if certs.len() != 1 {
        warn!(peer = %peer, count = certs.len(), "client did not present exactly one certificate");
        return;
    }

    let identity = match identity::common_name(&certs[0]) {
        Ok(identity) => identity,
        Err(err) => {
            warn!(peer = %peer, error = %err, "client certificate identity");
            return;
        }
    };

    let span = info_span!("session", peer = %peer, identity = %identity);
    async {
        let tun = match TunDevice::attach(&identity) {
            Ok(tun) => tun,
            Err(err) => {
                error!(error = %err, "attach tun");
                return;
            }
        };

        let session = shutdown.child_token();
        registry.supersede(&identity, session.clone());

        let tun = match TunEndpoint::new(tun) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                error!(error = %err, "size tun reader");
                return;
            }
        };
        let link = StreamEndpoint::new(conn);

        info!("bridging started");
        match bridge(session, &link, &tun).await {
            Err(err) if err.is_disconnect() => debug!(error = %err, "bridge ended"),
            Err(err) => warn!(error = %err, "bridge failed"),
            Ok(()) => {}
        }
        info!("bridging stopped");
    }
    .instrument(span)
    .await;
}
