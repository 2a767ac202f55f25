//! Configuration for the peer node

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use hyperpub_core::PeerAddress;

/// Default capacity of the dispatcher inbox
pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

/// Configuration for a [`HyperpubNode`](crate::HyperpubNode)
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node's hypercube address
    pub address: PeerAddress,
    /// Socket address to accept connections on
    pub listen: SocketAddr,
    /// Target of `list_topics` requests
    pub bootstrap: PeerAddress,
    /// Dispatcher channel capacity
    pub inbox_capacity: usize,
    /// Automated operations, disabled when `None`
    pub automation: Option<AutomationConfig>,
}

impl NodeConfig {
    /// Create a configuration for an address and listen socket
    ///
    /// The bootstrap address defaults to the all-zero address.
    pub fn new(address: PeerAddress, listen: SocketAddr) -> Self {
        Self {
            address,
            listen,
            bootstrap: address.origin(),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            automation: None,
        }
    }

    /// Create a configuration listening on `127.0.0.1:<port>`
    pub fn local(address: PeerAddress, port: u16) -> Self {
        Self::new(address, SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    /// Set the bootstrap address
    pub fn with_bootstrap(mut self, bootstrap: PeerAddress) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set the dispatcher channel capacity
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    /// Enable automated operations
    pub fn with_automation(mut self, automation: AutomationConfig) -> Self {
        self.automation = Some(automation);
        self
    }
}

/// Settings for the automated-operations and status tasks
#[derive(Debug, Clone)]
pub struct AutomationConfig {
    /// Shortest pause between operations
    pub min_delay: Duration,
    /// Longest pause between operations
    pub max_delay: Duration,
    /// Relative weight of creating a topic
    pub create_weight: f64,
    /// Relative weight of publishing to a subscribed topic
    pub publish_weight: f64,
    /// Relative weight of subscribing to a known topic
    pub subscribe_weight: f64,
    /// Period of the subscription status log
    pub status_interval: Duration,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
            create_weight: 0.3,
            publish_weight: 0.3,
            subscribe_weight: 0.4,
            status_interval: Duration::from_secs(10),
            seed: None,
        }
    }
}

impl AutomationConfig {
    /// Set the delay range between operations
    pub fn with_delays(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min.min(max);
        self.max_delay = min.max(max);
        self
    }

    /// Set the operation weights
    pub fn with_weights(mut self, create: f64, publish: f64, subscribe: f64) -> Self {
        self.create_weight = create;
        self.publish_weight = publish;
        self.subscribe_weight = subscribe;
        self
    }

    /// Set the status log period
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    /// Use a fixed RNG seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
