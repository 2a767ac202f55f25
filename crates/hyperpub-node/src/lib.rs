//! # Hyperpub Node
//!
//! Peer node for the Hyperpub hypercube publish/subscribe overlay.
//!
//! This crate provides [`HyperpubNode`], which ties together:
//! - Transport layer (TCP connection fabric with length-prefixed JSON frames)
//! - Routing layer (greedy hypercube forwarding)
//! - Storage layer (topic directory, subscriptions and unread queues)
//!
//! ## Example
//!
//! ```rust,ignore
//! use hyperpub_node::{HyperpubNode, NodeConfig};
//!
//! let address = "000".parse()?;
//! let node = HyperpubNode::new(NodeConfig::local(address, 8000))?;
//! node.start().await?;
//!
//! node.connect("001".parse()?, "127.0.0.1:8001").await?;
//! node.create_topic("T1").await?;
//! node.publish("T1", "hello").await?;
//!
//! let report = node.pull_all();
//! for (topic, messages) in &report.topics {
//!     println!("{topic}: {messages:?}");
//! }
//! ```

pub mod automation;
mod config;
mod context;
mod error;
pub mod message_handler;

pub use config::{AutomationConfig, DEFAULT_INBOX_CAPACITY, NodeConfig};
pub use context::{NodeContext, TopicListing};
pub use error::{NodeError, NodeResult};

pub use hyperpub_core::{PeerAddress, TopicKey, WireMessage};
pub use hyperpub_routing::RouteOutcome;
pub use hyperpub_storage::PullReport;
pub use hyperpub_transport::ConnectionStats;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use hyperpub_core::{Transport, TransportError, neighbors};
use hyperpub_transport::{ConnectionFabric, InboundMessage};

use automation::{AutomationTask, StatusTask};
use message_handler::MessageHandler;

/// A Hyperpub peer node
///
/// Owns the connection fabric and the shared [`NodeContext`], and runs the
/// accept loop, the message dispatcher and the optional automation tasks.
pub struct HyperpubNode {
    /// Node configuration
    config: NodeConfig,
    /// Connection table and socket tasks
    fabric: Arc<ConnectionFabric>,
    /// Shared topic and subscription state
    context: Arc<NodeContext<ConnectionFabric>>,
    /// Dispatcher end of the inbound channel, taken on start
    inbox: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    /// Background task handles
    background_tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    /// Address the listener actually bound to
    local_addr: RwLock<Option<SocketAddr>>,
    /// Whether the node is started
    started: AtomicBool,
}

impl HyperpubNode {
    /// Create a new node
    ///
    /// Nothing is bound until [`start`](Self::start).
    pub fn new(config: NodeConfig) -> NodeResult<Self> {
        if config.bootstrap.width() != config.address.width() {
            return Err(NodeError::Config(format!(
                "bootstrap address {} does not match width {}",
                config.bootstrap,
                config.address.width()
            )));
        }
        if config.inbox_capacity == 0 {
            return Err(NodeError::Config("inbox capacity must be positive".into()));
        }

        let (inbox_tx, inbox_rx) = mpsc::channel(config.inbox_capacity);
        let fabric = Arc::new(ConnectionFabric::new(config.address, inbox_tx));
        let context = Arc::new(NodeContext::new(Arc::clone(&fabric), config.bootstrap));
        let (shutdown_tx, _) = broadcast::channel(16);

        info!(address = %config.address, listen = %config.listen, "Node created");

        Ok(Self {
            config,
            fabric,
            context,
            inbox: Mutex::new(Some(inbox_rx)),
            shutdown_tx,
            background_tasks: tokio::sync::Mutex::new(Vec::new()),
            local_addr: RwLock::new(None),
            started: AtomicBool::new(false),
        })
    }

    /// Start the node
    ///
    /// Binds the listener and spawns the accept loop, the dispatcher and,
    /// when configured, the automation and status tasks. A stopped node
    /// cannot be started again.
    #[instrument(skip(self), fields(address = %self.config.address))]
    pub async fn start(&self) -> NodeResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadyStarted);
        }

        let Some(inbox) = self.inbox.lock().take() else {
            self.started.store(false, Ordering::SeqCst);
            return Err(NodeError::Config("a stopped node cannot be restarted".into()));
        };

        let automation = match &self.config.automation {
            Some(config) => match AutomationTask::new(
                Arc::clone(&self.context),
                config.clone(),
                self.shutdown_tx.subscribe(),
            ) {
                Ok(task) => Some((task, config.status_interval)),
                Err(e) => {
                    *self.inbox.lock() = Some(inbox);
                    self.started.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            },
            None => None,
        };

        let listener = match ConnectionFabric::bind(&self.config.listen.to_string()).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(listen = %self.config.listen, error = %e, "Failed to bind");
                *self.inbox.lock() = Some(inbox);
                self.started.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };
        let bound = listener.local_addr().map_err(TransportError::from)?;
        *self.local_addr.write() = Some(bound);

        let mut tasks = self.background_tasks.lock().await;
        tasks.push(self.fabric.spawn_acceptor(listener));
        tasks.push(MessageHandler::spawn(
            Arc::clone(&self.context),
            self.shutdown_tx.subscribe(),
            inbox,
        ));
        if let Some((task, status_interval)) = automation {
            tasks.push(task.spawn());
            tasks.push(StatusTask::spawn(
                Arc::clone(&self.context),
                status_interval,
                self.shutdown_tx.subscribe(),
            ));
        }

        info!(listen = %bound, "Node started");
        Ok(())
    }

    /// Stop the node
    ///
    /// Signals every task, closes all links and waits for the tasks to end.
    #[instrument(skip(self), fields(address = %self.config.address))]
    pub async fn stop(&self) -> NodeResult<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let _ = self.shutdown_tx.send(());
        self.fabric.shutdown().await;

        let mut tasks = self.background_tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }

        info!("Node stopped");
        Ok(())
    }

    /// Check if the node is started
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Socket address the listener is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    /// This node's hypercube address
    pub fn address(&self) -> PeerAddress {
        self.config.address
    }

    /// Get the node configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Shared node state
    pub fn context(&self) -> &Arc<NodeContext<ConnectionFabric>> {
        &self.context
    }

    /// Open a link to a peer listening at `endpoint`
    ///
    /// A newly registered link receives a `topic_sync` with every topic this
    /// node knows. Returns `false` when a link to the peer already existed.
    #[instrument(skip(self), fields(address = %self.config.address))]
    pub async fn connect(&self, peer: PeerAddress, endpoint: &str) -> NodeResult<bool> {
        if !self.is_started() {
            return Err(NodeError::NotStarted);
        }
        if peer == self.config.address {
            return Err(TransportError::ConnectionFailed("cannot connect to self".into()).into());
        }

        let registered = self.fabric.connect(peer, endpoint).await?;
        if registered {
            let topics = self.context.directory.names();
            if !topics.is_empty() {
                let count = topics.len();
                match self.fabric.send(&peer, &WireMessage::TopicSync { topics }).await {
                    Ok(()) => info!(peer = %peer, count, "Sent topic snapshot"),
                    Err(e) => warn!(peer = %peer, error = %e, "Failed to send topic snapshot"),
                }
            }
        }
        Ok(registered)
    }

    /// Connect to every hypercube neighbor at `host:base_port + value`
    ///
    /// Failures are logged per neighbor. Returns the neighbors that are
    /// connected afterwards.
    #[instrument(skip(self), fields(address = %self.config.address))]
    pub async fn connect_neighbors(
        &self,
        host: &str,
        base_port: u16,
    ) -> NodeResult<Vec<PeerAddress>> {
        if !self.is_started() {
            return Err(NodeError::NotStarted);
        }

        let mut connected = Vec::new();
        for neighbor in neighbors(&self.config.address) {
            let Some(port) = u16::try_from(neighbor.value())
                .ok()
                .and_then(|offset| base_port.checked_add(offset))
            else {
                warn!(neighbor = %neighbor, base_port, "Neighbor port out of range");
                continue;
            };

            let endpoint = format!("{}:{}", host, port);
            match self.connect(neighbor, &endpoint).await {
                Ok(_) => connected.push(neighbor),
                Err(e) => warn!(
                    neighbor = %neighbor,
                    endpoint = %endpoint,
                    error = %e,
                    "Failed to connect to neighbor"
                ),
            }
        }

        info!(connected = connected.len(), "Neighbor connections complete");
        Ok(connected)
    }

    /// Currently connected peers
    pub fn connected_peers(&self) -> Vec<PeerAddress> {
        self.fabric.connected_peers()
    }

    /// Connection statistics
    pub fn connection_stats(&self) -> ConnectionStats {
        self.fabric.stats()
    }

    /// Create a topic, subscribe to it and announce it
    pub async fn create_topic(&self, name: &str) -> NodeResult<TopicKey> {
        self.context.create_topic(name).await
    }

    /// Delete a topic and announce the deletion
    pub async fn delete_topic(&self, name: &str) -> NodeResult<()> {
        self.context.delete_topic(name).await
    }

    /// Subscribe to a known topic
    pub async fn subscribe(&self, name: &str) -> NodeResult<()> {
        self.context.subscribe(name).await
    }

    /// Drop a subscription
    pub fn unsubscribe(&self, name: &str) -> NodeResult<()> {
        self.context.unsubscribe(name)
    }

    /// Publish to a subscribed topic
    pub async fn publish(&self, topic: &str, message: &str) -> NodeResult<()> {
        self.context.publish(topic, message).await
    }

    /// Drain every unread queue
    pub fn pull_all(&self) -> PullReport {
        self.context.pull_all()
    }

    /// Known topics with subscription status
    pub fn list_topics(&self) -> Vec<TopicListing> {
        self.context.list_topics()
    }

    /// Ask the bootstrap node for its topic names
    pub async fn request_topics(&self) -> NodeResult<RouteOutcome> {
        self.context.request_topics().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(address: &str) -> NodeConfig {
        NodeConfig::local(address.parse().unwrap(), 0)
    }

    #[test]
    fn test_bootstrap_width_must_match() {
        let config = config("010").with_bootstrap("00".parse().unwrap());
        assert!(matches!(HyperpubNode::new(config), Err(NodeError::Config(_))));
    }

    #[test]
    fn test_zero_inbox_capacity_rejected() {
        let config = config("010").with_inbox_capacity(0);
        assert!(matches!(HyperpubNode::new(config), Err(NodeError::Config(_))));
    }

    #[tokio::test]
    async fn test_connect_requires_start() {
        let node = HyperpubNode::new(config("010")).unwrap();
        let result = node.connect("011".parse().unwrap(), "127.0.0.1:1").await;
        assert!(matches!(result, Err(NodeError::NotStarted)));
    }

    #[tokio::test]
    async fn test_stopped_node_cannot_restart() {
        let node = HyperpubNode::new(config("010")).unwrap();
        node.start().await.unwrap();
        node.stop().await.unwrap();

        assert!(matches!(node.start().await, Err(NodeError::Config(_))));
        assert!(!node.is_started());
    }

    #[tokio::test]
    async fn test_bind_failure_allows_retry() {
        let first = HyperpubNode::new(config("000")).unwrap();
        first.start().await.unwrap();
        let taken = first.local_addr().unwrap();

        let second =
            HyperpubNode::new(NodeConfig::new("001".parse().unwrap(), taken)).unwrap();
        assert!(matches!(second.start().await, Err(NodeError::Transport(_))));
        assert!(!second.is_started());

        first.stop().await.unwrap();
    }
}
