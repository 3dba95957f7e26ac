//! Packet reader for reliable byte streams.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{Ipv6Header, Packet, PacketError, HEADER_LEN};

/// Reads IPv6 packets from a byte stream, typically the TLS connection.
///
/// The stream carries a plain concatenation of marshalled packets. Each read
/// pulls exactly one header, validates it and then pulls exactly the declared
/// payload length, so the reader never consumes bytes belonging to the next
/// packet.
pub struct StreamReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> StreamReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next packet from the stream.
    ///
    /// A stream that ends cleanly before the first header byte yields
    /// [`PacketError::Eof`]; a stream that ends mid-packet yields an
    /// unexpected-EOF I/O error.
    pub async fn read_packet(&mut self) -> Result<Packet, PacketError> {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let count = self.reader.read(&mut header[filled..]).await?;
            if count == 0 {
                if filled == 0 {
                    return Err(PacketError::Eof);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream ended inside packet header",
                )
                .into());
            }
            filled += count;
        }

        let parsed = Ipv6Header::parse(&header)?;

        let mut marshalled = BytesMut::with_capacity(parsed.total_len());
        marshalled.extend_from_slice(&header);
        marshalled.resize(parsed.total_len(), 0);
        self.reader.read_exact(&mut marshalled[HEADER_LEN..]).await?;

        Ok(Packet {
            header: parsed,
            marshalled: marshalled.freeze(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::tests::dummy_packet;

    fn reader_for(data: Vec<u8>) -> StreamReader<std::io::Cursor<Vec<u8>>> {
        StreamReader::new(std::io::Cursor::new(data))
    }

    #[tokio::test]
    async fn reads_packet_back_verbatim() {
        let data = dummy_packet(5);
        let mut reader = reader_for(data.clone());

        let packet = reader.read_packet().await.unwrap();
        assert_eq!(&packet.marshalled[..], &data[..]);
        assert_eq!(packet.header.payload_len, 5);
        assert_eq!(packet.header.version, 6);
    }

    #[tokio::test]
    async fn reads_consecutive_packets_in_order() {
        let first = dummy_packet(3);
        let second = dummy_packet(9);
        let mut data = first.clone();
        data.extend_from_slice(&second);
        let mut reader = reader_for(data);

        assert_eq!(&reader.read_packet().await.unwrap().marshalled[..], &first[..]);
        assert_eq!(&reader.read_packet().await.unwrap().marshalled[..], &second[..]);
        assert!(matches!(
            reader.read_packet().await,
            Err(PacketError::Eof)
        ));
    }

    #[tokio::test]
    async fn clean_eof_before_first_byte() {
        let mut reader = reader_for(Vec::new());
        assert!(matches!(reader.read_packet().await, Err(PacketError::Eof)));
    }

    #[tokio::test]
    async fn partial_header_is_short_read() {
        let data = dummy_packet(5);
        let mut reader = reader_for(data[..HEADER_LEN - 1].to_vec());
        match reader.read_packet().await {
            Err(PacketError::Io(err)) => {
                assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
            }
            other => panic!("expected short read, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_payload_byte_is_short_read() {
        let data = dummy_packet(5);
        let mut reader = reader_for(data[..data.len() - 1].to_vec());
        match reader.read_packet().await {
            Err(PacketError::Io(err)) => {
                assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
            }
            other => panic!("expected short read, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_ipv4_packet() {
        let mut data = dummy_packet(5);
        data[0] = 0x45;
        let mut reader = reader_for(data);
        assert!(matches!(
            reader.read_packet().await,
            Err(PacketError::BadVersion(4))
        ));
    }

    #[tokio::test]
    async fn rejects_jumbo_packet() {
        let mut data = dummy_packet(5);
        data[4] = 0;
        data[5] = 0;
        let mut reader = reader_for(data);
        assert!(matches!(reader.read_packet().await, Err(PacketError::Jumbo)));
    }
}
