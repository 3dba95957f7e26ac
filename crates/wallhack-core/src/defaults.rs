//! Default configuration values.
//!
//! Centralized constants for use across all crates.

use std::time::Duration;

/// ALPN protocol token that selects the tunnel protocol on a shared port.
pub const ALPN_TUNNEL: &[u8] = b"wallhack";

/// Name of the local TUN interface a client attaches to.
pub const CLIENT_TUN_NAME: &str = "wallhack";

/// Environment variable naming the server address (`host:port`) a client dials.
pub const SERVER_ADDR_ENV: &str = "WALLHACK_SERVER";

/// Delay between client connection attempts. Fixed, no ramp: this links a
/// long-running pair of hosts, not a fleet hitting a shared service.
pub const DIAL_BACKOFF: Duration = Duration::from_secs(10);

/// How long shutdown waits for active sessions and the auxiliary service.
pub const SHUTDOWN_DRAIN: Duration = Duration::from_secs(3);

/// Capacity of each mux frontend queue of handshaken connections.
pub const FRONTEND_BACKLOG: usize = 16;
