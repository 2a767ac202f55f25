//! Automated operations and subscription status tasks
//!
//! The automation task drives a node without a human at the keyboard: after a
//! random pause it creates a topic, publishes to a subscribed topic or
//! subscribes to a known one, chosen by weight. The status task periodically
//! logs the subscription set.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hyperpub_core::Transport;

use crate::config::AutomationConfig;
use crate::context::NodeContext;
use crate::error::{NodeError, NodeResult};

/// Upper bound of the random suffix in generated topic and message names
const NAME_SUFFIX_MAX: u32 = 1000;

/// One automated driver action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create `Topic_<address>_<n>`
    CreateTopic,
    /// Publish `Message_<n>` to a random subscribed topic
    Publish,
    /// Subscribe to a random known but unsubscribed topic
    Subscribe,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateTopic => write!(f, "create"),
            Operation::Publish => write!(f, "publish"),
            Operation::Subscribe => write!(f, "subscribe"),
        }
    }
}

/// Background task issuing random driver operations
pub struct AutomationTask<T: Transport> {
    context: Arc<NodeContext<T>>,
    config: AutomationConfig,
    rng: StdRng,
    shutdown_rx: broadcast::Receiver<()>,
}

impl<T: Transport + 'static> AutomationTask<T> {
    /// Create the task, validating the operation weights
    pub fn new(
        context: Arc<NodeContext<T>>,
        config: AutomationConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> NodeResult<Self> {
        let weights = [config.create_weight, config.publish_weight, config.subscribe_weight];
        let invalid = weights.iter().any(|w| !w.is_finite() || *w < 0.0);
        if invalid || weights.iter().sum::<f64>() <= 0.0 {
            return Err(NodeError::Config(format!(
                "invalid automation weights {:?}",
                weights
            )));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            context,
            config,
            rng,
            shutdown_rx,
        })
    }

    /// Spawn the task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(mut self) {
        info!(
            node = %self.context.address(),
            min_ms = self.config.min_delay.as_millis() as u64,
            max_ms = self.config.max_delay.as_millis() as u64,
            "Automated operations started"
        );

        loop {
            let delay = self.next_delay();
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Automated operations shutting down");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    let (operation, result) = self.step().await;
                    if let Err(e) = result {
                        warn!(%operation, error = %e, "Automated operation failed");
                    }
                }
            }
        }
    }

    /// Pick and perform one operation
    pub async fn step(&mut self) -> (Operation, NodeResult<()>) {
        let operation = self.pick_operation();
        let result = match operation {
            Operation::CreateTopic => {
                let name = format!(
                    "Topic_{}_{}",
                    self.context.address(),
                    self.rng.random_range(1..=NAME_SUFFIX_MAX)
                );
                self.context.create_topic(&name).await.map(|_| ())
            }
            Operation::Publish => {
                let subscribed = self.context.subscriptions.subscribed_topics();
                match self.choose(&subscribed) {
                    Some(topic) => {
                        let message =
                            format!("Message_{}", self.rng.random_range(1..=NAME_SUFFIX_MAX));
                        self.context.publish(&topic, &message).await
                    }
                    None => {
                        debug!("No subscribed topics to publish to");
                        Ok(())
                    }
                }
            }
            Operation::Subscribe => {
                let candidates: Vec<String> = self
                    .context
                    .list_topics()
                    .into_iter()
                    .filter(|listing| !listing.subscribed)
                    .map(|listing| listing.name)
                    .collect();
                match self.choose(&candidates) {
                    Some(topic) => self.context.subscribe(&topic).await,
                    None => {
                        debug!("No unsubscribed topics known");
                        Ok(())
                    }
                }
            }
        };
        (operation, result)
    }

    fn pick_operation(&mut self) -> Operation {
        let total =
            self.config.create_weight + self.config.publish_weight + self.config.subscribe_weight;
        let roll = self.rng.random::<f64>() * total;

        if roll < self.config.create_weight {
            Operation::CreateTopic
        } else if roll < self.config.create_weight + self.config.publish_weight {
            Operation::Publish
        } else {
            Operation::Subscribe
        }
    }

    fn choose(&mut self, items: &[String]) -> Option<String> {
        if items.is_empty() {
            return None;
        }
        let index = self.rng.random_range(0..items.len());
        Some(items[index].clone())
    }

    fn next_delay(&mut self) -> Duration {
        let min = self.config.min_delay.as_millis() as u64;
        let max = self.config.max_delay.as_millis() as u64;
        Duration::from_millis(self.rng.random_range(min..=max.max(min)))
    }
}

/// Background task logging the subscription set
pub struct StatusTask<T: Transport> {
    context: Arc<NodeContext<T>>,
    interval: Duration,
    shutdown_rx: broadcast::Receiver<()>,
}

impl<T: Transport + 'static> StatusTask<T> {
    /// Spawn the status task
    pub fn spawn(
        context: Arc<NodeContext<T>>,
        interval: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let task = Self {
            context,
            interval,
            shutdown_rx,
        };

        tokio::spawn(async move {
            task.run().await;
        })
    }

    async fn run(mut self) {
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    debug!("Status task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let subscribed = self.context.subscriptions.subscribed_topics();
                    info!(
                        node = %self.context.address(),
                        count = subscribed.len(),
                        topics = ?subscribed,
                        peers = self.context.transport.connection_count(),
                        "Subscription status"
                    );
                }
            }
        }
    }
}
