//! Supervisor notification socket.

use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixDatagram;

use tracing::warn;

const NOTIFY_SOCKET_ENV: &str = "NOTIFY_SOCKET";

/// Connects to the supervisor's notification socket when one is announced.
///
/// The environment variable is consumed so child processes do not notify on
/// our behalf. Connection failures are logged and disable notifications for
/// the process lifetime; they never abort startup.
pub(crate) fn connect_from_env() -> Option<UnixDatagram> {
    let path = std::env::var_os(NOTIFY_SOCKET_ENV)?;
    std::env::remove_var(NOTIFY_SOCKET_ENV);

    let socket = match UnixDatagram::unbound() {
        Ok(socket) => socket,
        Err(err) => {
            warn!(error = %err, "supervisor notify socket unavailable");
            return None;
        }
    };

    let bytes = path.as_bytes();
    let connected = if let Some(name) = bytes.strip_prefix(b"@") {
        // Abstract namespace address.
        use std::os::linux::net::SocketAddrExt;
        std::os::unix::net::SocketAddr::from_abstract_name(name)
            .and_then(|addr| socket.connect_addr(&addr))
    } else {
        socket.connect(&path)
    };

    match connected {
        Ok(()) => Some(socket),
        Err(err) => {
            warn!(error = %err, socket = %path.to_string_lossy(), "supervisor notify socket unreachable");
            None
        }
    }
}
