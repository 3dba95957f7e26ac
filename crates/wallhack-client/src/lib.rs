//! Wallhack tunnel client.
//!
//! Dials the configured server, bridges the local TUN interface over the
//! TLS connection and redials whenever the link drops. Dial failures back
//! off for a fixed delay; a lost established tunnel redials immediately.

mod dial;
mod error;

pub use error::ClientError;
pub use tokio_util::sync::CancellationToken;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use wallhack_core::bridge;
use wallhack_core::defaults::{CLIENT_TUN_NAME, DIAL_BACKOFF, SERVER_ADDR_ENV};
use wallhack_service::Service;
use wallhack_transport::{tls, StreamEndpoint, TunDevice, TunEndpoint};

use dial::Dialer;

/// Runs the client until cancelled.
///
/// Returns an error for anything that cannot heal by redialing: a missing
/// or malformed server address, unusable credentials, or a TUN interface
/// that cannot be attached.
pub async fn run(service: &Service, shutdown: CancellationToken) -> Result<(), ClientError> {
    let server_addr = std::env::var(SERVER_ADDR_ENV)
        .map_err(|_| ClientError::Config(format!("{SERVER_ADDR_ENV} not set")))?;

    let credentials = service.load_credentials()?;
    let config = tls::client_config(&credentials.cert, &credentials.key, credentials.ca.as_deref())?;
    let dialer = Dialer::new(&server_addr, config)?;

    loop {
        service.status(&format!("dialing {server_addr}"));

        let conn = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            dialed = dialer.dial() => match dialed {
                Ok(conn) => conn,
                Err(err) => {
                    error!(server = %server_addr, error = %err, "could not open tunnel, backing off");
                    service.status(&format!("backing off from {server_addr}: {err}"));
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = sleep(DIAL_BACKOFF) => continue,
                    }
                }
            },
        };

        info!(server = %server_addr, "tunnel established");
        service.status(&format!("streaming to {server_addr}"));

        // The interface is provisioned by the host; not finding it is fatal.
        let tun = TunEndpoint::new(TunDevice::attach(CLIENT_TUN_NAME)?)?;
        let link = StreamEndpoint::new(conn);

        match bridge(shutdown.child_token(), &link, &tun).await {
            Err(err) if err.is_disconnect() => debug!(error = %err, "tunnel closed"),
            Err(err) => warn!(error = %err, "tunnel failed"),
            Ok(()) => {}
        }

        if shutdown.is_cancelled() {
            return Ok(());
        }
        info!(server = %server_addr, "tunnel lost, redialing");
    }
}
