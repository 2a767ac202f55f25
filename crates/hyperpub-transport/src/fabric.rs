//! TCP connection fabric
//!
//! Owns the table of live links keyed by peer address. Every stream opens
//! with a `hello` frame carrying the dialer's address, and the acceptor
//! answers with its own. A dialer whose reply names a different peer than
//! the one it meant to reach drops the stream.
//! Each stream gets a read task that decodes frames and pushes them to a
//! single inbox; sends to a peer go through that peer's write half under a
//! mutex so frames to the same peer are written in call order.
//!
//! When both sides dial each other, the first link registered for a peer
//! wins. Any later stream stays open read-only, since the other side may
//! have registered it as its own link. Removal on close only happens if the
//! table still holds the link that closed.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hyperpub_core::{
    Handshake, PeerAddress, ProtocolError, Transport, TransportError, WireMessage,
};

use crate::codec::{encode_message, frame_text, read_frame, write_frame};

/// A decoded frame together with the peer it arrived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Address announced in the stream's hello
    pub from: PeerAddress,
    /// The decoded message
    pub message: WireMessage,
}

/// Which side opened a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    /// We dialed the peer
    Outbound,
    /// The peer dialed us
    Inbound,
}

/// A registered, writable link to a peer
pub struct PeerLink {
    writer: Mutex<OwnedWriteHalf>,
    remote: SocketAddr,
    direction: LinkDirection,
}

impl PeerLink {
    fn new(writer: OwnedWriteHalf, remote: SocketAddr, direction: LinkDirection) -> Self {
        Self {
            writer: Mutex::new(writer),
            remote,
            direction,
        }
    }

    /// Socket address of the remote end
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Which side opened the link
    pub fn direction(&self) -> LinkDirection {
        self.direction
    }
}

/// Connection statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Registered links
    pub connected: usize,
    /// Links we dialed
    pub outbound: usize,
    /// Links the peer dialed
    pub inbound: usize,
}

/// Table of live peer links over TCP
pub struct ConnectionFabric {
    /// Our hypercube address
    local: PeerAddress,
    /// Registered links indexed by peer address
    links: DashMap<PeerAddress, Arc<PeerLink>>,
    /// Decoded frames from every stream
    inbox: mpsc::Sender<InboundMessage>,
    /// Stops the acceptor and all read tasks
    shutdown: broadcast::Sender<()>,
}

impl ConnectionFabric {
    /// Create a fabric that delivers decoded frames to `inbox`
    pub fn new(local: PeerAddress, inbox: mpsc::Sender<InboundMessage>) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            local,
            links: DashMap::new(),
            inbox,
            shutdown,
        }
    }

    /// Bind a listening socket
    pub async fn bind(listen: &str) -> Result<TcpListener, TransportError> {
        let listener = TcpListener::bind(listen)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", listen, e)))?;
        Ok(listener)
    }

    /// Spawn the accept loop for a bound listener
    pub fn spawn_acceptor(self: &Arc<Self>, listener: TcpListener) -> JoinHandle<()> {
        let fabric = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            if let Ok(addr) = listener.local_addr() {
                info!(local = %fabric.local, listen = %addr, "Accepting connections");
            }
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("Acceptor shutting down");
                        break;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((stream, remote)) => {
                            let fabric = Arc::clone(&fabric);
                            tokio::spawn(async move {
                                fabric.handle_inbound(stream, remote).await;
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        })
    }

    /// Open a link to a peer
    ///
    /// Returns `Ok(true)` if a new link was registered and `Ok(false)` if a
    /// link to the peer already existed.
    pub async fn connect(
        self: &Arc<Self>,
        peer: PeerAddress,
        endpoint: &str,
    ) -> Result<bool, TransportError> {
        if self.links.contains_key(&peer) {
            debug!(peer = %peer, "Reusing existing connection");
            return Ok(false);
        }
        if peer.width() != self.local.width() {
            return Err(TransportError::ConnectionFailed(format!(
                "peer {} has width {}, expected {}",
                peer,
                peer.width(),
                self.local.width()
            )));
        }

        let stream = TcpStream::connect(endpoint).await.map_err(|e| {
            warn!(peer = %peer, endpoint = %endpoint, error = %e, "Connection failed");
            TransportError::ConnectionFailed(format!("{}: {}", endpoint, e))
        })?;
        let remote = stream.peer_addr()?;
        let (mut reader, mut writer) = stream.into_split();

        let hello = Handshake::new(self.local).to_json()?;
        write_frame(&mut writer, &hello).await?;

        let answered = self.read_hello(&mut reader).await.inspect_err(|e| {
            warn!(peer = %peer, endpoint = %endpoint, error = %e, "Handshake failed");
        })?;
        if answered != peer {
            warn!(peer = %peer, answered = %answered, endpoint = %endpoint, "Wrong peer answered");
            return Err(ProtocolError::HandshakeFailed(format!(
                "{} answered as {}, expected {}",
                endpoint, answered, peer
            ))
            .into());
        }

        let link = Arc::new(PeerLink::new(writer, remote, LinkDirection::Outbound));
        let registered = match self.links.entry(peer) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&link));
                true
            }
        };
        if registered {
            info!(peer = %peer, remote = %remote, "Connection established");
        } else {
            // Lost the race against an inbound link; the peer may already be
            // writing to us on this stream
            debug!(peer = %peer, "Link registered concurrently, keeping stream read-only");
        }
        self.spawn_reader(peer, reader, link);
        Ok(registered)
    }

    /// Drop the link to a peer
    pub async fn disconnect(&self, peer: &PeerAddress) -> bool {
        match self.links.remove(peer) {
            Some((_, link)) => {
                let _ = link.writer.lock().await.shutdown().await;
                debug!(peer = %peer, "Closed connection");
                true
            }
            None => false,
        }
    }

    /// Stop all tasks and close every link
    pub async fn shutdown(&self) {
        info!(local = %self.local, "Shutting down connection fabric");
        let _ = self.shutdown.send(());

        let links: Vec<Arc<PeerLink>> = self.links.iter().map(|l| Arc::clone(l.value())).collect();
        self.links.clear();
        for link in links {
            let _ = link.writer.lock().await.shutdown().await;
        }
    }

    /// Socket address of the link to a peer
    pub fn remote_of(&self, peer: &PeerAddress) -> Option<SocketAddr> {
        self.links.get(peer).map(|l| l.remote())
    }

    /// Get connection statistics
    pub fn stats(&self) -> ConnectionStats {
        let mut stats = ConnectionStats::default();
        for link in self.links.iter() {
            stats.connected += 1;
            match link.direction() {
                LinkDirection::Outbound => stats.outbound += 1,
                LinkDirection::Inbound => stats.inbound += 1,
            }
        }
        stats
    }

    async fn handle_inbound(self: Arc<Self>, stream: TcpStream, remote: SocketAddr) {
        let (mut reader, mut writer) = stream.into_split();

        let peer = match self.read_hello(&mut reader).await {
            Ok(peer) => peer,
            Err(e) => {
                warn!(remote = %remote, error = %e, "Rejected inbound connection");
                return;
            }
        };

        let reply = match Handshake::new(self.local).to_json() {
            Ok(reply) => reply,
            Err(e) => {
                warn!(remote = %remote, error = %e, "Failed to encode hello");
                return;
            }
        };
        if let Err(e) = write_frame(&mut writer, &reply).await {
            warn!(peer = %peer, remote = %remote, error = %e, "Failed to answer hello");
            return;
        }

        // An unregistered link keeps its write half open until the reader ends
        let link = Arc::new(PeerLink::new(writer, remote, LinkDirection::Inbound));
        match self.links.entry(peer) {
            Entry::Occupied(_) => {
                debug!(
                    peer = %peer,
                    remote = %remote,
                    "Peer already linked, keeping stream read-only"
                );
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&link));
            }
        }

        info!(peer = %peer, remote = %remote, "Accepted incoming connection");
        self.spawn_reader(peer, reader, link);
    }

    async fn read_hello(&self, reader: &mut OwnedReadHalf) -> Result<PeerAddress, TransportError> {
        let body = read_frame(reader)
            .await?
            .ok_or_else(|| ProtocolError::HandshakeFailed("stream closed before hello".into()))?;
        let hello = Handshake::from_json(frame_text(&body)?)?;

        if hello.address.width() != self.local.width() {
            return Err(ProtocolError::HandshakeFailed(format!(
                "address {} has width {}, expected {}",
                hello.address,
                hello.address.width(),
                self.local.width()
            ))
            .into());
        }
        if hello.address == self.local {
            return Err(ProtocolError::HandshakeFailed(format!(
                "peer claims our own address {}",
                hello.address
            ))
            .into());
        }
        Ok(hello.address)
    }

    fn spawn_reader(
        self: &Arc<Self>,
        peer: PeerAddress,
        reader: OwnedReadHalf,
        link: Arc<PeerLink>,
    ) {
        let fabric = Arc::clone(self);
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            fabric.read_loop(peer, reader, shutdown).await;
            fabric.unregister(&peer, &link);
        });
    }

    async fn read_loop(
        &self,
        peer: PeerAddress,
        mut reader: OwnedReadHalf,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            let body = tokio::select! {
                _ = shutdown.recv() => break,
                frame = read_frame(&mut reader) => match frame {
                    Ok(Some(body)) => body,
                    Ok(None) => {
                        info!(peer = %peer, "Peer closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "Connection lost");
                        break;
                    }
                }
            };

            let message = match frame_text(&body).and_then(WireMessage::from_json) {
                Ok(message) => message,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Dropping undecodable frame");
                    continue;
                }
            };

            debug!(peer = %peer, kind = message.kind(), "Received message");
            if self
                .inbox
                .send(InboundMessage { from: peer, message })
                .await
                .is_err()
            {
                debug!("Inbox closed, stopping reader");
                break;
            }
        }
    }

    fn unregister(&self, peer: &PeerAddress, link: &Arc<PeerLink>) {
        if self.links.remove_if(peer, |_, current| Arc::ptr_eq(current, link)).is_some() {
            debug!(peer = %peer, "Removed closed connection");
        }
    }
}

#[async_trait]
impl Transport for ConnectionFabric {
    fn local_address(&self) -> PeerAddress {
        self.local
    }

    async fn send(&self, peer: &PeerAddress, message: &WireMessage) -> Result<(), TransportError> {
        let link = self
            .links
            .get(peer)
            .map(|l| Arc::clone(l.value()))
            .ok_or_else(|| TransportError::PeerNotConnected(peer.to_string()))?;

        let frame = encode_message(message)?;
        let mut writer = link.writer.lock().await;
        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;
        drop(writer);

        if let Err(e) = written {
            self.unregister(peer, &link);
            return Err(TransportError::SendFailed(format!("{}: {}", peer, e)));
        }
        debug!(peer = %peer, kind = message.kind(), "Sent message");
        Ok(())
    }

    fn is_connected(&self, peer: &PeerAddress) -> bool {
        self.links.contains_key(peer)
    }

    fn connected_peers(&self) -> Vec<PeerAddress> {
        let mut peers: Vec<PeerAddress> = self.links.iter().map(|l| *l.key()).collect();
        peers.sort();
        peers
    }

    fn connection_count(&self) -> usize {
        self.links.len()
    }
}
