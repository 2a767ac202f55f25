//! Node context and driver operations
//!
//! [`NodeContext`] owns the topic directory, the subscription manager and the
//! router. Every task gets an `Arc` to it; nothing touches shared state any
//! other way. The context is generic over the transport so the same
//! operations run against the TCP fabric or a recording mock.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use hyperpub_core::{
    BroadcastTransport, PeerAddress, StateError, TopicKey, Transport, ValidationError,
    WireMessage,
};
use hyperpub_routing::{HypercubeRouter, RouteOutcome};
use hyperpub_storage::{PullReport, SubscriptionManager, TopicDirectory};

use crate::error::NodeResult;

/// A known topic and whether this node is subscribed to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicListing {
    /// Topic name
    pub name: String,
    /// Whether the topic is in the subscription set
    pub subscribed: bool,
}

/// Shared state of one node
pub struct NodeContext<T: Transport> {
    /// Target of `list_topics` requests
    bootstrap: PeerAddress,
    /// Topic name -> message log
    pub(crate) directory: TopicDirectory,
    /// Subscription set and unread queues
    pub(crate) subscriptions: SubscriptionManager,
    /// Connection table
    pub(crate) transport: Arc<T>,
    /// Greedy forwarding over `transport`
    pub(crate) router: HypercubeRouter<T>,
}

impl<T: Transport> NodeContext<T> {
    /// Create a context over a transport
    pub fn new(transport: Arc<T>, bootstrap: PeerAddress) -> Self {
        Self {
            bootstrap,
            directory: TopicDirectory::new(),
            subscriptions: SubscriptionManager::new(),
            router: HypercubeRouter::new(Arc::clone(&transport)),
            transport,
        }
    }

    /// This node's address
    pub fn address(&self) -> PeerAddress {
        self.transport.local_address()
    }

    /// Target of `list_topics` requests
    pub fn bootstrap(&self) -> PeerAddress {
        self.bootstrap
    }

    /// The topic directory
    pub fn directory(&self) -> &TopicDirectory {
        &self.directory
    }

    /// The subscription manager
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// The transport
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Create a topic and subscribe to it
    ///
    /// Announces the topic to every connected peer with `topic_sync`.
    #[instrument(skip(self), fields(node = %self.address()))]
    pub async fn create_topic(&self, name: &str) -> NodeResult<TopicKey> {
        require_topic(name)?;
        let key = self.directory.create(name).inspect_err(|_| {
            warn!(topic = %name, "Topic already exists");
        })?;
        self.subscriptions.subscribe(name);
        info!(topic = %name, key = %key.short_hex(), "Created topic");

        self.broadcast(WireMessage::TopicSync {
            topics: vec![name.to_string()],
        })
        .await;
        Ok(key)
    }

    /// Delete a topic locally and ask peers to do the same
    #[instrument(skip(self), fields(node = %self.address()))]
    pub async fn delete_topic(&self, name: &str) -> NodeResult<()> {
        self.directory.remove(name).inspect_err(|_| {
            warn!(topic = %name, "Cannot delete unknown topic");
        })?;
        self.subscriptions.unsubscribe_or_delete(name);
        info!(topic = %name, "Deleted topic");

        self.broadcast(WireMessage::DeleteTopic {
            topics: vec![name.to_string()],
        })
        .await;
        Ok(())
    }

    /// Subscribe to a known topic
    ///
    /// An unknown topic triggers a `list_topics` request toward the bootstrap
    /// node and is reported as [`StateError::TopicNotFound`].
    #[instrument(skip(self), fields(node = %self.address()))]
    pub async fn subscribe(&self, name: &str) -> NodeResult<()> {
        require_topic(name)?;
        if !self.directory.contains(name) {
            warn!(topic = %name, "Topic not found, requesting topic list");
            if let Err(e) = self.request_topics().await {
                warn!(error = %e, "Topic list request failed");
            }
            return Err(StateError::TopicNotFound(name.to_string()).into());
        }
        if !self.subscriptions.subscribe(name) {
            return Err(StateError::AlreadySubscribed(name.to_string()).into());
        }

        self.broadcast(WireMessage::Subscribe {
            topic: name.to_string(),
            subscriber: self.address(),
        })
        .await;
        Ok(())
    }

    /// Drop a subscription and its unread queue
    ///
    /// The topic stays in the directory.
    pub fn unsubscribe(&self, name: &str) -> NodeResult<()> {
        if !self.subscriptions.is_subscribed(name) {
            return Err(StateError::NotSubscribed(name.to_string()).into());
        }
        self.subscriptions.unsubscribe_or_delete(name);
        info!(topic = %name, "Unsubscribed");
        Ok(())
    }

    /// Publish a message to a subscribed topic
    ///
    /// Appends to the local log and unread queue, then broadcasts. Delivery
    /// to peers is fire-and-forget.
    #[instrument(skip(self, message), fields(node = %self.address()))]
    pub async fn publish(&self, topic: &str, message: &str) -> NodeResult<()> {
        require_topic(topic)?;
        if message.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        if !self.directory.contains(topic) {
            return Err(StateError::TopicNotFound(topic.to_string()).into());
        }
        if !self.subscriptions.is_subscribed(topic) {
            return Err(StateError::NotSubscribed(topic.to_string()).into());
        }

        let outcome = self.directory.append(topic, message.to_string());
        self.subscriptions.on_message_arrival(topic, message.to_string());
        info!(topic = %topic, length = outcome.length, "Published message");

        self.broadcast(WireMessage::Publish {
            topic: topic.to_string(),
            message: message.to_string(),
        })
        .await;
        Ok(())
    }

    /// Drain every unread queue
    pub fn pull_all(&self) -> PullReport {
        let report = self.subscriptions.pull_all();
        for (topic, messages) in &report.topics {
            if !messages.is_empty() {
                info!(topic = %topic, count = messages.len(), "Delivered unread messages");
            }
        }
        report
    }

    /// Known topics with subscription status, sorted by name
    pub fn list_topics(&self) -> Vec<TopicListing> {
        self.directory
            .names()
            .into_iter()
            .map(|name| TopicListing {
                subscribed: self.subscriptions.is_subscribed(&name),
                name,
            })
            .collect()
    }

    /// Ask the bootstrap node for its topic names
    ///
    /// The answer arrives later as an ordinary `topic_sync`.
    pub async fn request_topics(&self) -> NodeResult<RouteOutcome> {
        self.route_request(
            self.bootstrap,
            WireMessage::ListTopics {
                requesting_peer: self.address(),
            },
        )
        .await
    }

    /// Route a payload this node originates
    ///
    /// Local targets are dispatched in place. When greedy forwarding fails,
    /// the alternative route is tried once.
    pub async fn route_request(
        &self,
        target: PeerAddress,
        payload: WireMessage,
    ) -> NodeResult<RouteOutcome> {
        match self.router.route(target, payload.clone(), Vec::new()).await {
            Ok(RouteOutcome::DeliverLocally(payload)) => {
                self.handle_message(self.address(), payload.clone()).await?;
                Ok(RouteOutcome::DeliverLocally(payload))
            }
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                debug!(target = %target, error = %e, "Primary route failed, trying alternative");
                Ok(self.router.try_alternative_route(target, payload, Vec::new()).await?)
            }
        }
    }

    /// Best-effort send to every connected peer
    pub(crate) async fn broadcast(&self, message: WireMessage) -> Vec<PeerAddress> {
        let delivered = self.transport.broadcast(&message).await;
        debug!(kind = message.kind(), peers = delivered.len(), "Broadcast sent");
        delivered
    }
}

fn require_topic(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyTopic);
    }
    Ok(())
}
