//! Subscriptions and unread queues
//!
//! Invariant: every subscribed topic has an unread queue (possibly empty).
//! Both live under one mutex so the invariant holds at every observable
//! point.

use std::collections::{BTreeMap, HashSet};

use parking_lot::Mutex;
use tracing::{debug, info};

/// Result of [`SubscriptionManager::pull_all`]
///
/// Contains one entry per existing queue. A topic mapped to an empty `Vec`
/// had a queue with nothing unread; a topic that is absent had no queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Drained messages per topic
    pub topics: BTreeMap<String, Vec<String>>,
}

impl PullReport {
    /// Messages drained for a topic, `None` if it had no queue
    pub fn messages_for(&self, topic: &str) -> Option<&[String]> {
        self.topics.get(topic).map(Vec::as_slice)
    }

    /// Whether the topic had a queue at pull time
    pub fn has_queue(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Total number of drained messages
    pub fn total_messages(&self) -> usize {
        self.topics.values().map(Vec::len).sum()
    }

    /// True if nothing was drained
    pub fn is_empty(&self) -> bool {
        self.total_messages() == 0
    }
}

#[derive(Debug, Default)]
struct SubscriptionState {
    subscribed: HashSet<String>,
    unread: BTreeMap<String, Vec<String>>,
}

/// Tracks subscribed topics and buffers undelivered messages
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    state: Mutex<SubscriptionState>,
}

impl SubscriptionManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a topic
    ///
    /// Returns `true` if the topic was not already subscribed. The topic's
    /// queue is created if missing and kept if present.
    pub fn subscribe(&self, topic: &str) -> bool {
        let mut state = self.state.lock();
        state.unread.entry(topic.to_string()).or_default();
        let added = state.subscribed.insert(topic.to_string());
        if added {
            info!(topic = %topic, "Subscribed");
        }
        added
    }

    /// Create an empty queue for a topic without subscribing
    ///
    /// Returns `true` if the queue was created.
    pub fn ensure_queue(&self, topic: &str) -> bool {
        let mut state = self.state.lock();
        if state.unread.contains_key(topic) {
            return false;
        }
        state.unread.insert(topic.to_string(), Vec::new());
        true
    }

    /// Drop the subscription and the queue
    ///
    /// Returns `true` if either existed.
    pub fn unsubscribe_or_delete(&self, topic: &str) -> bool {
        let mut state = self.state.lock();
        let was_subscribed = state.subscribed.remove(topic);
        let dropped = state.unread.remove(topic);
        if was_subscribed || dropped.is_some() {
            debug!(
                topic = %topic,
                was_subscribed,
                discarded = dropped.map(|q| q.len()).unwrap_or(0),
                "Subscription and queue dropped"
            );
            true
        } else {
            false
        }
    }

    /// Queue a message if the topic is subscribed
    ///
    /// Returns `true` if the message was queued.
    pub fn on_message_arrival(&self, topic: &str, message: String) -> bool {
        let mut state = self.state.lock();
        if !state.subscribed.contains(topic) {
            return false;
        }
        state.unread.entry(topic.to_string()).or_default().push(message);
        true
    }

    /// Drain every queue
    ///
    /// Runs under the manager lock, so a message arriving concurrently lands
    /// either in this report or in the next one, never in neither.
    pub fn pull_all(&self) -> PullReport {
        let mut state = self.state.lock();
        let topics = state
            .unread
            .iter_mut()
            .map(|(topic, queue)| (topic.clone(), std::mem::take(queue)))
            .collect();
        let report = PullReport { topics };
        debug!(
            messages = report.total_messages(),
            queues = report.topics.len(),
            "Pulled unread messages"
        );
        report
    }

    /// Check if subscribed to a topic
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.state.lock().subscribed.contains(topic)
    }

    /// Check if a topic has a queue
    pub fn has_queue(&self, topic: &str) -> bool {
        self.state.lock().unread.contains_key(topic)
    }

    /// Number of unread messages for a topic
    pub fn unread_count(&self, topic: &str) -> usize {
        self.state
            .lock()
            .unread
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Subscribed topics, sorted
    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.state.lock().subscribed.iter().cloned().collect();
        topics.sort();
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_creates_queue() {
        let manager = SubscriptionManager::new();
        assert!(manager.subscribe("T1"));
        assert!(!manager.subscribe("T1"));
        assert!(manager.is_subscribed("T1"));
        assert!(manager.has_queue("T1"));
        assert_eq!(manager.unread_count("T1"), 0);
    }

    #[test]
    fn test_subscribe_keeps_existing_queue() {
        let manager = SubscriptionManager::new();
        manager.subscribe("T1");
        manager.on_message_arrival("T1", "a".into());
        manager.subscribe("T1");
        assert_eq!(manager.unread_count("T1"), 1);
    }

    #[test]
    fn test_arrival_requires_subscription() {
        let manager = SubscriptionManager::new();
        manager.ensure_queue("T1");
        assert!(!manager.on_message_arrival("T1", "a".into()));
        assert_eq!(manager.unread_count("T1"), 0);

        manager.subscribe("T1");
        assert!(manager.on_message_arrival("T1", "b".into()));
        assert_eq!(manager.unread_count("T1"), 1);
    }

    #[test]
    fn test_unsubscribe_drops_queue() {
        let manager = SubscriptionManager::new();
        manager.subscribe("T1");
        manager.on_message_arrival("T1", "a".into());

        assert!(manager.unsubscribe_or_delete("T1"));
        assert!(!manager.is_subscribed("T1"));
        assert!(!manager.has_queue("T1"));
        assert!(!manager.unsubscribe_or_delete("T1"));
    }

    #[test]
    fn test_pull_all_drains_and_reports_empty_queues() {
        let manager = SubscriptionManager::new();
        manager.subscribe("T1");
        manager.ensure_queue("T2");
        manager.on_message_arrival("T1", "hello".into());
        manager.on_message_arrival("T1", "world".into());

        let first = manager.pull_all();
        assert_eq!(
            first.messages_for("T1"),
            Some(&["hello".to_string(), "world".to_string()][..])
        );
        assert_eq!(first.messages_for("T2"), Some(&[][..]));
        assert!(!first.has_queue("T3"));
        assert_eq!(first.total_messages(), 2);

        let second = manager.pull_all();
        assert!(second.is_empty());
        assert!(second.has_queue("T1"));
        assert_eq!(second.messages_for("T1"), Some(&[][..]));
    }

    #[test]
    fn test_subscribed_topics_sorted() {
        let manager = SubscriptionManager::new();
        manager.subscribe("b");
        manager.subscribe("a");
        assert_eq!(manager.subscribed_topics(), vec!["a".to_string(), "b".to_string()]);
    }
}
