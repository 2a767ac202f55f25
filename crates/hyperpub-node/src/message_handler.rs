//! Background message handler for processing incoming network messages
//!
//! Handles:
//! - Routing envelopes (deliver locally or forward one hop)
//! - Topic sync and delete announcements
//! - Published messages
//! - Subscribe notices
//! - Topic list requests (answered with a routed `topic_sync`)
//!
//! All inbound traffic arrives on one channel and is processed by a single
//! task in arrival order.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hyperpub_core::{PeerAddress, Transport, WireMessage};
use hyperpub_routing::RouteOutcome;
use hyperpub_transport::InboundMessage;

use crate::context::NodeContext;
use crate::error::NodeResult;

/// Boxed future returned by the dispatcher
pub type DispatchFuture<'a> = Pin<Box<dyn Future<Output = NodeResult<()>> + Send + 'a>>;

impl<T: Transport> NodeContext<T> {
    /// Apply one message received from `from`
    ///
    /// Boxed because a `list_topics` request may route its reply back to
    /// this node, which re-enters the dispatcher.
    pub fn handle_message(&self, from: PeerAddress, message: WireMessage) -> DispatchFuture<'_> {
        Box::pin(async move {
            match message {
                WireMessage::Route { target, data, path } => {
                    self.handle_route(from, target, *data, path).await
                }
                WireMessage::TopicSync { topics } => {
                    self.handle_topic_sync(from, topics);
                    Ok(())
                }
                WireMessage::DeleteTopic { topics } => {
                    self.handle_delete(from, topics);
                    Ok(())
                }
                WireMessage::Publish { topic, message } => {
                    self.handle_publish(from, &topic, message);
                    Ok(())
                }
                WireMessage::Subscribe { topic, subscriber } => {
                    if self.directory.ensure(&topic) {
                        self.subscriptions.ensure_queue(&topic);
                    }
                    info!(topic = %topic, subscriber = %subscriber, "Peer subscribed");
                    Ok(())
                }
                WireMessage::ListTopics { requesting_peer } => {
                    let topics = self.directory.names();
                    debug!(
                        requester = %requesting_peer,
                        count = topics.len(),
                        "Answering topic list request"
                    );
                    self.route_request(requesting_peer, WireMessage::TopicSync { topics })
                        .await
                        .map(|_| ())
                }
            }
        })
    }

    async fn handle_route(
        &self,
        from: PeerAddress,
        target: PeerAddress,
        data: WireMessage,
        path: Vec<PeerAddress>,
    ) -> NodeResult<()> {
        match self.router.route(target, data, path).await? {
            RouteOutcome::DeliverLocally(payload) => {
                debug!(from = %from, kind = payload.kind(), "Route reached target");
                self.handle_message(from, payload).await
            }
            RouteOutcome::Forwarded { .. } => Ok(()),
        }
    }

    fn handle_topic_sync(&self, from: PeerAddress, topics: Vec<String>) {
        let mut added = 0usize;
        for topic in &topics {
            if self.directory.ensure(topic) {
                self.subscriptions.ensure_queue(topic);
                added += 1;
            }
        }
        if added > 0 {
            info!(from = %from, added, "Learned topics");
        }
    }

    fn handle_delete(&self, from: PeerAddress, topics: Vec<String>) {
        for topic in &topics {
            if self.directory.remove(topic).is_ok() {
                info!(from = %from, topic = %topic, "Topic deleted by peer");
            }
            self.subscriptions.unsubscribe_or_delete(topic);
        }
    }

    fn handle_publish(&self, from: PeerAddress, topic: &str, message: String) {
        let outcome = self.directory.append(topic, message.clone());
        if outcome.created {
            self.subscriptions.ensure_queue(topic);
        }
        if self.subscriptions.on_message_arrival(topic, message) {
            debug!(from = %from, topic = %topic, "Queued message for subscriber");
        }
    }
}

/// Background task draining the inbound channel
pub struct MessageHandler<T: Transport> {
    /// Shared node state
    context: Arc<NodeContext<T>>,
    /// Shutdown signal
    shutdown_rx: broadcast::Receiver<()>,
}

impl<T: Transport + 'static> MessageHandler<T> {
    /// Spawn the handler as a background task
    pub fn spawn(
        context: Arc<NodeContext<T>>,
        shutdown_rx: broadcast::Receiver<()>,
        inbox: mpsc::Receiver<InboundMessage>,
    ) -> JoinHandle<()> {
        let handler = Self {
            context,
            shutdown_rx,
        };

        tokio::spawn(async move {
            handler.run(inbox).await;
        })
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<InboundMessage>) {
        info!(node = %self.context.address(), "Message handler started");

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Message handler shutting down");
                    break;
                }
                received = inbox.recv() => {
                    let Some(InboundMessage { from, message }) = received else {
                        debug!("Inbound channel closed");
                        break;
                    };
                    let kind = message.kind();
                    if let Err(e) = self.context.handle_message(from, message).await {
                        warn!(from = %from, kind, error = %e, "Failed to handle message");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperpub_core::{MockTransport, RoutingError};

    use crate::error::NodeError;

    fn addr(s: &str) -> PeerAddress {
        s.parse().unwrap()
    }

    fn context(local: &str, peers: &[&str]) -> (Arc<MockTransport>, NodeContext<MockTransport>) {
        let transport = Arc::new(MockTransport::with_peers(
            addr(local),
            peers.iter().map(|p| addr(p)),
        ));
        let ctx = NodeContext::new(Arc::clone(&transport), addr(local).origin());
        (transport, ctx)
    }

    fn sync(topics: &[&str]) -> WireMessage {
        WireMessage::TopicSync {
            topics: topics.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_topic_sync_adds_unsubscribed_topics() {
        let (_, ctx) = context("001", &[]);
        ctx.handle_message(addr("000"), sync(&["T1", "T2"])).await.unwrap();

        assert_eq!(ctx.directory.names(), vec!["T1", "T2"]);
        assert!(!ctx.subscriptions.is_subscribed("T1"));
        assert!(ctx.subscriptions.has_queue("T1"));
    }

    #[tokio::test]
    async fn test_topic_sync_keeps_existing_log() {
        let (_, ctx) = context("001", &[]);
        ctx.directory.create("T1").unwrap();
        ctx.directory.append("T1", "kept".into());

        ctx.handle_message(addr("000"), sync(&["T1"])).await.unwrap();
        assert_eq!(ctx.directory.get("T1").unwrap(), vec!["kept"]);
    }

    #[tokio::test]
    async fn test_publish_reaches_unread_queue_of_subscriber() {
        let (_, ctx) = context("001", &[]);
        ctx.handle_message(addr("000"), sync(&["T1"])).await.unwrap();
        ctx.subscriptions.subscribe("T1");

        let publish = WireMessage::Publish {
            topic: "T1".into(),
            message: "hello".into(),
        };
        ctx.handle_message(addr("000"), publish).await.unwrap();

        assert_eq!(ctx.directory.get("T1").unwrap(), vec!["hello"]);
        assert_eq!(ctx.subscriptions.unread_count("T1"), 1);
    }

    #[tokio::test]
    async fn test_publish_to_unknown_topic_creates_it() {
        let (_, ctx) = context("001", &[]);
        let publish = WireMessage::Publish {
            topic: "fresh".into(),
            message: "m".into(),
        };
        ctx.handle_message(addr("000"), publish).await.unwrap();

        assert_eq!(ctx.directory.get("fresh").unwrap(), vec!["m"]);
        assert!(!ctx.subscriptions.is_subscribed("fresh"));
        assert_eq!(ctx.subscriptions.unread_count("fresh"), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_topic_and_subscription() {
        let (_, ctx) = context("001", &[]);
        ctx.directory.create("T1").unwrap();
        ctx.subscriptions.subscribe("T1");

        let delete = WireMessage::DeleteTopic {
            topics: vec!["T1".into(), "absent".into()],
        };
        ctx.handle_message(addr("000"), delete).await.unwrap();

        assert!(!ctx.directory.contains("T1"));
        assert!(!ctx.subscriptions.is_subscribed("T1"));
        assert!(!ctx.subscriptions.has_queue("T1"));
    }

    #[tokio::test]
    async fn test_subscribe_notice_learns_topic() {
        let (_, ctx) = context("001", &[]);
        let notice = WireMessage::Subscribe {
            topic: "T9".into(),
            subscriber: addr("011"),
        };
        ctx.handle_message(addr("011"), notice).await.unwrap();

        assert!(ctx.directory.contains("T9"));
        assert!(!ctx.subscriptions.is_subscribed("T9"));
    }

    #[tokio::test]
    async fn test_route_for_self_is_dispatched() {
        let (transport, ctx) = context("011", &["001"]);
        let envelope = WireMessage::route(addr("011"), sync(&["routed"]), vec![addr("001")]);

        ctx.handle_message(addr("001"), envelope).await.unwrap();

        assert!(ctx.directory.contains("routed"));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_transit_route_forwards_with_extended_path() {
        let (transport, ctx) = context("100", &["000", "110", "101"]);
        let envelope = WireMessage::route(addr("111"), sync(&["x"]), vec![addr("000")]);

        ctx.handle_message(addr("000"), envelope).await.unwrap();

        let sent = transport.sent_to(&addr("110"));
        assert_eq!(
            sent,
            vec![WireMessage::route(
                addr("111"),
                sync(&["x"]),
                vec![addr("000"), addr("100")]
            )]
        );
        assert!(!ctx.directory.contains("x"));
    }

    #[tokio::test]
    async fn test_transit_route_without_closer_neighbor_is_dropped() {
        let (transport, ctx) = context("100", &["000"]);
        let envelope = WireMessage::route(addr("111"), sync(&["x"]), vec![addr("000")]);

        let result = ctx.handle_message(addr("000"), envelope).await;
        assert!(matches!(
            result,
            Err(NodeError::Routing(RoutingError::NoCloserNeighbor { .. }))
        ));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_list_topics_reply_is_routed_to_requester() {
        let (transport, ctx) = context("000", &["100", "010", "001"]);
        ctx.directory.create("b").unwrap();
        ctx.directory.create("a").unwrap();

        let request = WireMessage::ListTopics {
            requesting_peer: addr("011"),
        };
        ctx.handle_message(addr("010"), request).await.unwrap();

        let sent = transport.sent_to(&addr("010"));
        assert_eq!(
            sent,
            vec![WireMessage::route(addr("011"), sync(&["a", "b"]), vec![addr("000")])]
        );
    }

    #[tokio::test]
    async fn test_list_topics_from_self_is_answered_locally() {
        let (transport, ctx) = context("000", &[]);
        ctx.directory.create("a").unwrap();

        let request = WireMessage::ListTopics {
            requesting_peer: addr("000"),
        };
        ctx.handle_message(addr("000"), request).await.unwrap();

        assert!(transport.sent().is_empty());
        assert_eq!(ctx.directory.names(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_handler_task_drains_inbox_and_stops() {
        let (_, ctx) = context("001", &[]);
        let ctx = Arc::new(ctx);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (inbox_tx, inbox_rx) = mpsc::channel(8);

        let handle = MessageHandler::spawn(Arc::clone(&ctx), shutdown_rx, inbox_rx);
        inbox_tx
            .send(InboundMessage {
                from: addr("000"),
                message: sync(&["T1"]),
            })
            .await
            .unwrap();

        for _ in 0..100 {
            if ctx.directory.contains("T1") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(ctx.directory.contains("T1"));

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
