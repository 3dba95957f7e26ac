//! Core types shared across wallhack crates.
//!
//! This crate provides:
//! - The packet model: an IPv6 header view plus the marshalled bytes
//! - The two packet readers (byte stream and MTU-bounded datagram source)
//! - The `PacketEndpoint` trait and the bidirectional bridge engine
//! - Default constants

pub mod bridge;
pub mod defaults;
pub mod packet;

pub use bridge::{bridge, BridgeError, PacketEndpoint};
pub use packet::{Ipv6Header, MtuReader, MtuSource, Packet, PacketError, StreamReader, HEADER_LEN};

/// Project name.
pub const PROJECT_NAME: &str = "wallhack";
/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
