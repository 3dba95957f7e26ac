//! Concrete packet endpoints for the bridge.
//!
//! Both endpoints expose interior-mutable halves so the bridge's copy loops
//! and close watchers can share one handle: reads and writes are serialized
//! through their own async mutexes, and `close` trips a token that unblocks
//! whichever operation is in flight with [`PacketError::Closed`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use wallhack_core::{MtuReader, MtuSource, Packet, PacketEndpoint, PacketError, StreamReader};

use crate::tun::TunDevice;

/// Packet endpoint over a byte stream, typically a TLS connection.
pub struct StreamEndpoint<S> {
    reader: Mutex<StreamReader<ReadHalf<S>>>,
    writer: Mutex<WriteHalf<S>>,
    closed: CancellationToken,
}

impl<S: AsyncRead + AsyncWrite> StreamEndpoint<S> {
    pub fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(StreamReader::new(read_half)),
            writer: Mutex::new(write_half),
            closed: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Send> PacketEndpoint for StreamEndpoint<S> {
    async fn read_packet(&self) -> Result<Packet, PacketError> {
        tokio::select! {
            biased;

            _ = self.closed.cancelled() => Err(PacketError::Closed),
            result = async { self.reader.lock().await.read_packet().await } => result,
        }
    }

    async fn write_packet(&self, packet: Packet) -> Result<(), PacketError> {
        tokio::select! {
            biased;

            _ = self.closed.cancelled() => Err(PacketError::Closed),
            result = async {
                let mut writer = self.writer.lock().await;
                writer.write_all(&packet.marshalled).await?;
                writer.flush().await?;
                Ok(())
            } => result,
        }
    }

    async fn close(&self) -> Result<(), PacketError> {
        self.closed.cancel();
        Ok(())
    }
}

/// [`MtuSource`] view of a shared TUN device handle.
pub struct TunSource(Arc<TunDevice>);

#[async_trait]
impl MtuSource for TunSource {
    async fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.recv(buf).await
    }

    fn mtu(&self) -> std::io::Result<usize> {
        self.0.mtu()
    }
}

/// Packet endpoint over an attached TUN device.
pub struct TunEndpoint {
    device: Arc<TunDevice>,
    reader: Mutex<MtuReader<TunSource>>,
    closed: CancellationToken,
}

impl TunEndpoint {
    /// Wraps an attached device, sizing the read buffer for its current MTU.
    pub fn new(device: TunDevice) -> std::io::Result<Self> {
        let device = Arc::new(device);
        let reader = MtuReader::new(TunSource(device.clone()))?;
        Ok(Self {
            device,
            reader: Mutex::new(reader),
            closed: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl PacketEndpoint for TunEndpoint {
    async fn read_packet(&self) -> Result<Packet, PacketError> {
        tokio::select! {
            biased;

            _ = self.closed.cancelled() => Err(PacketError::Closed),
            result = async { self.reader.lock().await.read_packet().await } => result,
        }
    }

    async fn write_packet(&self, packet: Packet) -> Result<(), PacketError> {
        let mtu = self.device.mtu()?;
        if packet.len() > mtu {
            return Err(PacketError::OverMtu {
                mtu,
                len: packet.len(),
            });
        }

        tokio::select! {
            biased;

            _ = self.closed.cancelled() => Err(PacketError::Closed),
            result = self.device.send(&packet.marshalled) => result.map_err(PacketError::from),
        }
    }

    async fn close(&self) -> Result<(), PacketError> {
        self.closed.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use wallhack_core::{bridge, HEADER_LEN};

    fn sample_packet(payload_len: u16) -> Packet {
        let mut data = vec![0u8; HEADER_LEN + usize::from(payload_len)];
        data[0] = 0x60;
        data[4..6].copy_from_slice(&payload_len.to_be_bytes());
        let header = wallhack_core::Ipv6Header::parse(&data).unwrap();
        Packet {
            header,
            marshalled: data.into(),
        }
    }

    #[tokio::test]
    async fn stream_endpoint_round_trips_packets() {
        let (near, far) = tokio::io::duplex(4096);
        let endpoint = StreamEndpoint::new(near);
        let peer = StreamEndpoint::new(far);

        let packet = sample_packet(7);
        endpoint.write_packet(packet.clone()).await.unwrap();

        let received = peer.read_packet().await.unwrap();
        assert_eq!(received.marshalled, packet.marshalled);
    }

    #[tokio::test]
    async fn close_unblocks_pending_read() {
        let (near, _far) = tokio::io::duplex(4096);
        let endpoint = Arc::new(StreamEndpoint::new(near));

        let pending = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move { endpoint.read_packet().await })
        };
        tokio::task::yield_now().await;

        endpoint.close().await.unwrap();
        assert!(matches!(
            pending.await.unwrap(),
            Err(PacketError::Closed)
        ));
    }

    #[tokio::test]
    async fn writes_after_close_are_rejected() {
        let (near, _far) = tokio::io::duplex(4096);
        let endpoint = StreamEndpoint::new(near);

        endpoint.close().await.unwrap();
        assert!(matches!(
            endpoint.write_packet(sample_packet(1)).await,
            Err(PacketError::Closed)
        ));
    }

    #[tokio::test]
    async fn bridged_stream_endpoints_forward_between_peers() {
        // a <-> b and c <-> d are two byte pipes; bridging b and c should
        // make packets written into a come out of d.
        let (a, b) = tokio::io::duplex(4096);
        let (c, d) = tokio::io::duplex(4096);

        let left = StreamEndpoint::new(b);
        let right = StreamEndpoint::new(c);
        let outer_a = StreamEndpoint::new(a);

        let packet = sample_packet(5);
        outer_a.write_packet(packet.clone()).await.unwrap();

        let shutdown = CancellationToken::new();
        let run = bridge(shutdown.clone(), &left, &right);
        tokio::pin!(run);

        let mut d = d;
        let mut received = vec![0u8; packet.len()];
        tokio::select! {
            _ = &mut run => panic!("bridge ended before packet arrived"),
            result = d.read_exact(&mut received) => { result.unwrap(); }
        }
        assert_eq!(&received[..], &packet.marshalled[..]);

        shutdown.cancel();
        let err = run.await.unwrap_err();
        assert!(err.is_disconnect());
    }
}
