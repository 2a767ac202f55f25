//! Mock transport implementation for testing
//!
//! Records every send instead of writing to a socket, so routing and
//! dispatch tests can assert exactly which peer received which message.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hyperpub_core::{MockTransport, Transport};
//!
//! let transport = MockTransport::new("000".parse()?);
//! transport.connect("100".parse()?);
//! transport.send(&"100".parse()?, &message).await?;
//! assert_eq!(transport.sent().len(), 1);
//! ```

use async_trait::async_trait;
use dashmap::DashSet;
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::identity::PeerAddress;
use crate::message::WireMessage;
use crate::transport::Transport;

/// A message captured by [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// The peer it was sent to
    pub peer: PeerAddress,
    /// The message payload
    pub message: WireMessage,
}

/// A recording transport for testing
pub struct MockTransport {
    /// Our address
    local: PeerAddress,
    /// Peers treated as connected
    connected: DashSet<PeerAddress>,
    /// Connected peers whose sends fail
    failing: DashSet<PeerAddress>,
    /// Every successful send, in order
    sent: Mutex<Vec<SentMessage>>,
}

impl MockTransport {
    /// Create a mock transport with no connections
    pub fn new(local: PeerAddress) -> Self {
        Self {
            local,
            connected: DashSet::new(),
            failing: DashSet::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock transport connected to the given peers
    pub fn with_peers(local: PeerAddress, peers: impl IntoIterator<Item = PeerAddress>) -> Self {
        let transport = Self::new(local);
        for peer in peers {
            transport.connect(peer);
        }
        transport
    }

    /// Mark a peer as connected
    pub fn connect(&self, peer: PeerAddress) {
        self.connected.insert(peer);
    }

    /// Remove a peer's connection
    pub fn disconnect(&self, peer: &PeerAddress) {
        self.connected.remove(peer);
    }

    /// Make sends to a connected peer fail
    pub fn fail_sends_to(&self, peer: PeerAddress) {
        self.failing.insert(peer);
    }

    /// Snapshot of recorded sends
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Drain recorded sends
    pub fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Recorded sends to one peer
    pub fn sent_to(&self, peer: &PeerAddress) -> Vec<WireMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|s| &s.peer == peer)
            .map(|s| s.message.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn local_address(&self) -> PeerAddress {
        self.local
    }

    async fn send(&self, peer: &PeerAddress, message: &WireMessage) -> Result<(), TransportError> {
        if !self.connected.contains(peer) {
            return Err(TransportError::PeerNotConnected(peer.to_string()));
        }
        if self.failing.contains(peer) {
            return Err(TransportError::SendFailed(format!("injected failure to {}", peer)));
        }

        self.sent.lock().push(SentMessage {
            peer: *peer,
            message: message.clone(),
        });
        Ok(())
    }

    fn is_connected(&self, peer: &PeerAddress) -> bool {
        self.connected.contains(peer)
    }

    fn connected_peers(&self) -> Vec<PeerAddress> {
        let mut peers: Vec<PeerAddress> = self.connected.iter().map(|p| *p).collect();
        peers.sort();
        peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BroadcastTransport;

    fn addr(s: &str) -> PeerAddress {
        s.parse().unwrap()
    }

    fn sync(topic: &str) -> WireMessage {
        WireMessage::TopicSync {
            topics: vec![topic.to_string()],
        }
    }

    #[tokio::test]
    async fn test_send_records_message() {
        let transport = MockTransport::with_peers(addr("000"), [addr("100")]);

        transport.send(&addr("100"), &sync("T1")).await.unwrap();

        assert_eq!(transport.sent_to(&addr("100")), vec![sync("T1")]);
        assert_eq!(transport.take_sent().len(), 1);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_to_unconnected_peer_fails() {
        let transport = MockTransport::new(addr("000"));
        let result = transport.send(&addr("100"), &sync("T1")).await;
        assert!(matches!(result, Err(TransportError::PeerNotConnected(_))));
    }

    #[tokio::test]
    async fn test_broadcast_continues_past_failures() {
        let transport =
            MockTransport::with_peers(addr("000"), [addr("100"), addr("010"), addr("001")]);
        transport.fail_sends_to(addr("010"));

        let delivered = transport.broadcast(&sync("T1")).await;

        assert_eq!(delivered, vec![addr("001"), addr("100")]);
        assert!(transport.sent_to(&addr("010")).is_empty());
    }

    #[test]
    fn test_disconnect() {
        let transport = MockTransport::with_peers(addr("000"), [addr("100")]);
        assert!(transport.is_connected(&addr("100")));
        transport.disconnect(&addr("100"));
        assert!(!transport.is_connected(&addr("100")));
        assert_eq!(transport.connection_count(), 0);
    }
}
