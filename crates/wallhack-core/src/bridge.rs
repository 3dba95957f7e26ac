//! Bidirectional packet copy engine.
//!
//! A bridge connects two full-duplex packet endpoints and copies packets in
//! both directions until either direction fails, then makes sure both
//! endpoints are closed and reports every collected error.

use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::packet::{Packet, PacketError};

/// A full-duplex packet endpoint the bridge can copy between.
///
/// `close` must unblock any in-flight `read_packet`/`write_packet` on the
/// same endpoint with [`PacketError::Closed`].
#[async_trait]
pub trait PacketEndpoint: Send + Sync {
    async fn read_packet(&self) -> Result<Packet, PacketError>;
    async fn write_packet(&self, packet: Packet) -> Result<(), PacketError>;
    async fn close(&self) -> Result<(), PacketError>;
}

/// Aggregate outcome of the four bridge tasks.
///
/// At least one entry is always present: the copy loops only terminate by
/// error (end-of-stream included), so a bridge run never succeeds outright.
#[derive(Debug)]
pub struct BridgeError {
    pub errors: Vec<PacketError>,
}

impl BridgeError {
    /// True when every collected error merely reports a disconnect. Such
    /// outcomes are routine teardown, not failures worth alerting on.
    pub fn is_disconnect(&self) -> bool {
        self.errors.iter().all(PacketError::is_disconnect)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ ")?;
        for (index, err) in self.errors.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{err}")?;
        }
        write!(f, " ]")
    }
}

impl std::error::Error for BridgeError {}

/// Copies packets between `left` and `right` until either direction fails,
/// then closes both endpoints and returns all collected errors.
///
/// Four futures cooperate: two copy loops and two close watchers parked on a
/// bridge-local child of `shutdown`. Whichever copy loop finishes first
/// cancels the group; the watchers then close both endpoints, which unblocks
/// the remaining loop. Cancelling `shutdown` tears the bridge down the same
/// way. Within a direction packets keep their order; no ordering holds
/// between directions.
pub async fn bridge<L, R>(
    shutdown: CancellationToken,
    left: &L,
    right: &R,
) -> Result<(), BridgeError>
where
    L: PacketEndpoint + ?Sized,
    R: PacketEndpoint + ?Sized,
{
    let group = shutdown.child_token();

    let forward = async {
        let result = copy_packets(left, right).await;
        group.cancel();
        result
    };
    let backward = async {
        let result = copy_packets(right, left).await;
        group.cancel();
        result
    };
    let close_left = async {
        group.cancelled().await;
        left.close().await
    };
    let close_right = async {
        group.cancelled().await;
        right.close().await
    };

    let outcomes = tokio::join!(forward, backward, close_left, close_right);

    let errors: Vec<PacketError> = [outcomes.0, outcomes.1, outcomes.2, outcomes.3]
        .into_iter()
        .filter_map(Result::err)
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(BridgeError { errors })
    }
}

async fn copy_packets<S, D>(src: &S, dst: &D) -> Result<(), PacketError>
where
    S: PacketEndpoint + ?Sized,
    D: PacketEndpoint + ?Sized,
{
    loop {
        let packet = src.read_packet().await?;
        dst.write_packet(packet).await?;
    }
}
