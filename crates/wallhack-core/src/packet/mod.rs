//! IPv6 packet model and validation.
//!
//! The tunnel carries whole IPv6 packets with no extra framing: the IPv6
//! header already declares the payload length, so the header *is* the frame.
//! Both readers produce [`Packet`] values that satisfy the same invariants:
//! `marshalled.len() == HEADER_LEN + header.payload_len`, `version == 6` and
//! `payload_len > 0` (jumbograms are not supported).

mod mtu;
mod stream;

pub use mtu::{MtuReader, MtuSource};
pub use stream::StreamReader;

use std::net::Ipv6Addr;

use bytes::Bytes;

/// Length in bytes of a fixed IPv6 header.
pub const HEADER_LEN: usize = 40;

/// The only IP version accepted on the framed path.
const IPV6_VERSION: u8 = 6;

/// Errors produced by the packet layer.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("packet header too short: {0} bytes")]
    HeaderTooShort(usize),
    #[error("unsupported ip version {0}")]
    BadVersion(u8),
    #[error("unsupported jumbo packet")]
    Jumbo,
    #[error("missing parts of packet: expected {expected}, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("packet exceeds interface mtu: mtu {mtu}, packet {len}")]
    OverMtu { mtu: usize, len: usize },
    #[error("end of stream")]
    Eof,
    #[error("endpoint closed")]
    Closed,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl PacketError {
    /// Whether this error only signals that the peer or a local resource went
    /// away. Disconnects are expected during teardown and are logged quietly.
    pub fn is_disconnect(&self) -> bool {
        match self {
            PacketError::Eof | PacketError::Closed => true,
            PacketError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

/// Parsed view of a fixed IPv6 header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Header {
    pub version: u8,
    pub traffic_class: u8,
    pub flow_label: u32,
    pub payload_len: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
}

impl Ipv6Header {
    /// Parses and validates the fixed header at the start of `data`.
    ///
    /// Rejects anything that is not IPv6 and packets declaring a zero payload
    /// length (the jumbo extension is not supported).
    pub fn parse(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < HEADER_LEN {
            return Err(PacketError::HeaderTooShort(data.len()));
        }

        let version = data[0] >> 4;
        if version != IPV6_VERSION {
            return Err(PacketError::BadVersion(version));
        }

        let payload_len = u16::from_be_bytes([data[4], data[5]]);
        if payload_len == 0 {
            return Err(PacketError::Jumbo);
        }

        let mut source = [0u8; 16];
        source.copy_from_slice(&data[8..24]);
        let mut destination = [0u8; 16];
        destination.copy_from_slice(&data[24..40]);

        Ok(Self {
            version,
            traffic_class: (data[0] & 0x0f) << 4 | data[1] >> 4,
            flow_label: u32::from(data[1] & 0x0f) << 16
                | u32::from(data[2]) << 8
                | u32::from(data[3]),
            payload_len,
            next_header: data[6],
            hop_limit: data[7],
            source: Ipv6Addr::from(source),
            destination: Ipv6Addr::from(destination),
        })
    }

    /// Total packet length declared by this header.
    pub fn total_len(&self) -> usize {
        HEADER_LEN + usize::from(self.payload_len)
    }
}

/// One IPv6 packet: the parsed header view and the full marshalled bytes
/// (header plus payload). Created by a reader, consumed by a writer which
/// emits `marshalled` verbatim.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: Ipv6Header,
    pub marshalled: Bytes,
}

impl Packet {
    /// Length in bytes of the marshalled packet.
    pub fn len(&self) -> usize {
        self.marshalled.len()
    }

    /// True if the packet carries no bytes. Never the case for packets
    /// produced by the readers.
    pub fn is_empty(&self) -> bool {
        self.marshalled.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a minimal well-formed IPv6 packet with the given payload length.
    pub(crate) fn dummy_packet(payload_len: u16) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN + usize::from(payload_len)];
        data[0] = 0x60;
        data[4..6].copy_from_slice(&payload_len.to_be_bytes());
        data[7] = 64;
        for (offset, byte) in data[HEADER_LEN..].iter_mut().enumerate() {
            *byte = offset as u8;
        }
        data
    }

    #[test]
    fn parse_extracts_fields() {
        let mut data = dummy_packet(5);
        data[0] = 0x6a; // traffic class upper nibble
        data[1] = 0xbc; // traffic class lower nibble + flow label high bits
        data[2] = 0xde;
        data[3] = 0xf0;
        data[6] = 17;
        data[23] = 1; // last byte of source address
        data[39] = 2; // last byte of destination address

        let header = Ipv6Header::parse(&data).unwrap();
        assert_eq!(header.version, 6);
        assert_eq!(header.traffic_class, 0xab);
        assert_eq!(header.flow_label, 0x0cdef0);
        assert_eq!(header.payload_len, 5);
        assert_eq!(header.next_header, 17);
        assert_eq!(header.hop_limit, 64);
        assert_eq!(header.source, "::1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(header.destination, "::2".parse::<Ipv6Addr>().unwrap());
        assert_eq!(header.total_len(), HEADER_LEN + 5);
    }

    #[test]
    fn parse_rejects_ipv4() {
        let mut data = dummy_packet(5);
        data[0] = 0x45;
        assert!(matches!(
            Ipv6Header::parse(&data),
            Err(PacketError::BadVersion(4))
        ));
    }

    #[test]
    fn parse_rejects_jumbo() {
        let mut data = dummy_packet(5);
        data[4] = 0;
        data[5] = 0;
        assert!(matches!(Ipv6Header::parse(&data), Err(PacketError::Jumbo)));
    }

    #[test]
    fn parse_rejects_short_header() {
        let data = dummy_packet(5);
        assert!(matches!(
            Ipv6Header::parse(&data[..HEADER_LEN - 1]),
            Err(PacketError::HeaderTooShort(_))
        ));
    }
}
