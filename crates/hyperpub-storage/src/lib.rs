//! # Hyperpub Storage
//!
//! Per-node topic state.
//!
//! - [`TopicDirectory`]: hash-keyed table of topic records, each holding the
//!   topic name and its ordered message log. Despite sitting in a
//!   peer-to-peer overlay this is a local cache: every node keeps its own
//!   copy and reconciles only through explicit `topic_sync` broadcasts.
//!   There is no key-space ownership.
//! - [`SubscriptionManager`]: the set of topics this node cares about plus a
//!   per-topic unread queue.
//!
//! Both are lock-guarded and safe to share across tasks behind an `Arc`.
//! Compound operations (`append`, `create`, `pull_all`) run under a single
//! guard so no other writer can interleave.
//!
//! ## Example
//!
//! ```rust,ignore
//! use hyperpub_storage::{SubscriptionManager, TopicDirectory};
//!
//! let directory = TopicDirectory::new();
//! let subscriptions = SubscriptionManager::new();
//!
//! directory.create("news")?;
//! subscriptions.subscribe("news");
//!
//! directory.append("news", "hello".into());
//! subscriptions.on_message_arrival("news", "hello".into());
//!
//! let report = subscriptions.pull_all();
//! assert_eq!(report.messages_for("news"), Some(&["hello".to_string()][..]));
//! ```

pub mod directory;
pub mod subscription;

// Re-exports
pub use directory::{AppendOutcome, TopicDirectory, TopicRecord};
pub use subscription::{PullReport, SubscriptionManager};
