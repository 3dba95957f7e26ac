//! Packet reader for MTU-bounded datagram sources.

use async_trait::async_trait;
use bytes::Bytes;

use super::{Ipv6Header, Packet, PacketError, HEADER_LEN};

/// A datagram-shaped packet source with a queryable MTU, typically a TUN
/// device. Each `recv` returns exactly one packet.
#[async_trait]
pub trait MtuSource: Send {
    /// Receives one packet into `buf` and returns its length. A return of 0
    /// means the source is exhausted.
    async fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Current MTU of the source in bytes.
    fn mtu(&self) -> std::io::Result<usize>;
}

/// Reads IPv6 packets from an [`MtuSource`].
///
/// The reader owns a buffer of `mtu + 1` bytes. A read that fills the whole
/// buffer means the packet was larger than the buffer, which only happens
/// when the MTU grew after the buffer was sized: the oversized packet is
/// dropped, the MTU is requeried, the buffer reallocated and the read retried
/// once. If the retry fills the new buffer as well the reader gives up with
/// [`PacketError::OverMtu`].
pub struct MtuReader<S> {
    source: S,
    buffer: Vec<u8>,
}

impl<S: MtuSource> MtuReader<S> {
    /// Creates a reader sized for the source's current MTU.
    pub fn new(source: S) -> std::io::Result<Self> {
        let mtu = source.mtu()?;
        Ok(Self {
            source,
            buffer: vec![0; mtu + 1],
        })
    }

    /// Reads the next packet from the source.
    pub async fn read_packet(&mut self) -> Result<Packet, PacketError> {
        let mut count = self.recv_chunk().await?;

        if count == self.buffer.len() {
            let mtu = self.source.mtu()?;
            self.buffer = vec![0; mtu + 1];
            count = self.recv_chunk().await?;
            if count == self.buffer.len() {
                return Err(PacketError::OverMtu { mtu, len: count });
            }
        }

        let data = &self.buffer[..count];
        let header = Ipv6Header::parse(data)?;

        if usize::from(header.payload_len) != count - HEADER_LEN {
            return Err(PacketError::Truncated {
                expected: header.total_len(),
                got: count,
            });
        }

        Ok(Packet {
            header,
            marshalled: Bytes::copy_from_slice(data),
        })
    }

    async fn recv_chunk(&mut self) -> Result<usize, PacketError> {
        let count = self.source.recv(&mut self.buffer).await?;
        if count == 0 {
            return Err(PacketError::Eof);
        }
        Ok(count)
    }
}
