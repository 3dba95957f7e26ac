//! # wallhack
//!
//! A point-to-point layer-3 tunnel carrying IPv6 packets between peers over
//! mutually-authenticated TLS. Each endpoint owns a kernel TUN interface;
//! packets from the TUN are framed by their own IPv6 headers onto the TLS
//! stream, and packets from the peer are injected into the local TUN. A
//! server multiplexes many clients, each identified by the common name of
//! its client certificate.
//!
//! ## Crates
//!
//! - [`wallhack_core`] - Packet model, framing readers, bridge engine
//! - [`wallhack_transport`] - TUN device, TLS configuration, endpoints
//! - [`wallhack_service`] - Supervisor integration
//! - [`wallhack_server`] - ALPN mux, session registry, server sessions
//! - [`wallhack_client`] - Reconnecting client

pub use wallhack_client as client;
pub use wallhack_core as core;
pub use wallhack_server as server;
pub use wallhack_service as service;
pub use wallhack_transport as transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use wallhack_client::ClientError;
    pub use wallhack_core::{bridge, BridgeError, Packet, PacketEndpoint, PacketError};
    pub use wallhack_server::{Auxiliary, CancellationToken, ServerError, TlsMux};
    pub use wallhack_service::{Credentials, Service};
    pub use wallhack_transport::{StreamEndpoint, TransportError, TunDevice, TunEndpoint};
}
