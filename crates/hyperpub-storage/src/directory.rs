//! Topic directory
//!
//! Forward map `TopicKey -> TopicRecord` plus reverse map `name -> TopicKey`,
//! both behind one `RwLock` so they are always updated together.

use std::collections::HashMap;

use hyperpub_core::{StateError, TopicKey};
use parking_lot::RwLock;
use tracing::{debug, trace};

/// A topic and its message log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRecord {
    /// Human-readable topic name
    pub name: String,
    /// Messages in arrival order
    pub messages: Vec<String>,
}

/// Result of [`TopicDirectory::append`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// The record did not exist and was created by this append
    pub created: bool,
    /// Log length after the append
    pub length: usize,
}

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<TopicKey, TopicRecord>,
    names: HashMap<String, TopicKey>,
}

impl Tables {
    fn insert(&mut self, name: &str, messages: Vec<String>) -> Option<Vec<String>> {
        let key = TopicKey::for_name(name);
        self.names.insert(name.to_string(), key);
        self.records
            .insert(
                key,
                TopicRecord {
                    name: name.to_string(),
                    messages,
                },
            )
            .map(|previous| previous.messages)
    }
}

/// Local hash-keyed topic table
#[derive(Debug, Default)]
pub struct TopicDirectory {
    tables: RwLock<Tables>,
}

impl TopicDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a topic's log, overwriting any existing log
    ///
    /// Last write wins; there is no merge. Returns the replaced log.
    pub fn put(&self, name: &str, messages: Vec<String>) -> Option<Vec<String>> {
        let previous = self.tables.write().insert(name, messages);
        trace!(topic = %name, replaced = previous.is_some(), "Topic log stored");
        previous
    }

    /// Get a copy of a topic's log
    pub fn get(&self, name: &str) -> Option<Vec<String>> {
        self.tables
            .read()
            .records
            .get(&TopicKey::for_name(name))
            .map(|record| record.messages.clone())
    }

    /// Remove a topic and its reverse mapping
    pub fn remove(&self, name: &str) -> Result<TopicRecord, StateError> {
        let key = TopicKey::for_name(name);
        let mut tables = self.tables.write();

        let record = tables
            .records
            .remove(&key)
            .ok_or_else(|| StateError::TopicNotFound(name.to_string()))?;
        tables.names.remove(&record.name);

        debug!(
            topic = %name,
            key = %key.short_hex(),
            messages = record.messages.len(),
            "Topic removed"
        );
        Ok(record)
    }

    /// Check if a topic exists
    pub fn contains(&self, name: &str) -> bool {
        self.tables
            .read()
            .records
            .contains_key(&TopicKey::for_name(name))
    }

    /// Create an empty topic, rejecting duplicates
    pub fn create(&self, name: &str) -> Result<TopicKey, StateError> {
        let key = TopicKey::for_name(name);
        let mut tables = self.tables.write();
        if tables.records.contains_key(&key) {
            return Err(StateError::TopicExists(name.to_string()));
        }
        tables.insert(name, Vec::new());
        Ok(key)
    }

    /// Create an empty topic if absent
    ///
    /// Returns `true` if this call created it. Concurrent callers race
    /// safely: exactly one of them sees `true`.
    pub fn ensure(&self, name: &str) -> bool {
        let key = TopicKey::for_name(name);
        let mut tables = self.tables.write();
        if tables.records.contains_key(&key) {
            return false;
        }
        tables.insert(name, Vec::new());
        true
    }

    /// Append one message, creating the topic if needed
    pub fn append(&self, name: &str, message: String) -> AppendOutcome {
        let key = TopicKey::for_name(name);
        let mut tables = self.tables.write();

        let created = !tables.records.contains_key(&key);
        if created {
            tables.insert(name, Vec::new());
        }

        let length = match tables.records.get_mut(&key) {
            Some(record) => {
                record.messages.push(message);
                record.messages.len()
            }
            None => 0,
        };

        AppendOutcome { created, length }
    }

    /// All topic names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().names.keys().cloned().collect();
        names.sort();
        names
    }

    /// Original name for a key
    pub fn name_for(&self, key: &TopicKey) -> Option<String> {
        self.tables
            .read()
            .records
            .get(key)
            .map(|record| record.name.clone())
    }

    /// Key recorded for a name in the reverse map
    pub fn key_of(&self, name: &str) -> Option<TopicKey> {
        self.tables.read().names.get(name).copied()
    }

    /// Number of topics
    pub fn len(&self) -> usize {
        self.tables.read().records.len()
    }

    /// Check if the directory has no topics
    pub fn is_empty(&self) -> bool {
        self.tables.read().records.is_empty()
    }
}
