//! Transport layer for wallhack.
//!
//! Provides the kernel TUN device handle, rustls configuration for both ends
//! of the tunnel and the two concrete [`wallhack_core::PacketEndpoint`]
//! implementations (TLS stream and TUN device).

mod endpoint;
mod error;
pub mod tls;
pub mod tun;

pub use endpoint::{StreamEndpoint, TunEndpoint};
pub use error::TransportError;
pub use tun::TunDevice;
