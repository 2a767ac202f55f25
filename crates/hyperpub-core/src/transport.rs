//! Transport abstraction for message passing
//!
//! The [`Transport`] trait is the seam between routing/dispatch logic and the
//! connection table. The TCP connection fabric implements it for real
//! networking; [`MockTransport`](crate::MockTransport) records sends for
//! tests.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::identity::PeerAddress;
use crate::message::WireMessage;

/// Transport trait for sending to directly connected peers
#[async_trait]
pub trait Transport: Send + Sync {
    /// Address of the local node
    fn local_address(&self) -> PeerAddress;

    /// Send one message to a connected peer
    ///
    /// Sends to the same peer are delivered in call order. There is no
    /// acknowledgment: `Ok` means the frame was written, not received.
    async fn send(&self, peer: &PeerAddress, message: &WireMessage) -> Result<(), TransportError>;

    /// Check if a link to the peer is registered
    fn is_connected(&self, peer: &PeerAddress) -> bool;

    /// Get all currently connected peers
    fn connected_peers(&self) -> Vec<PeerAddress>;

    /// Get the number of connected peers
    fn connection_count(&self) -> usize {
        self.connected_peers().len()
    }
}

/// Extension trait for best-effort fan-out
#[async_trait]
pub trait BroadcastTransport: Transport {
    /// Send to every connected peer
    ///
    /// A failure on one link is logged and does not stop the others.
    /// Returns the peers the message was written to.
    async fn broadcast(&self, message: &WireMessage) -> Vec<PeerAddress> {
        let peers = self.connected_peers();
        let mut delivered = Vec::with_capacity(peers.len());

        for peer in peers {
            match self.send(&peer, message).await {
                Ok(()) => delivered.push(peer),
                Err(e) => {
                    warn!(peer = %peer, kind = message.kind(), error = %e, "Broadcast send failed");
                }
            }
        }

        debug!(
            kind = message.kind(),
            delivered = delivered.len(),
            "Broadcast complete"
        );
        delivered
    }
}

/// Blanket implementation of BroadcastTransport for all Transport implementations
impl<T: Transport + ?Sized> BroadcastTransport for T {}
