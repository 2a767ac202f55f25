//! Hypercube router implementation
//!
//! The [`HypercubeRouter`] decides the next hop for a payload and performs
//! the single send over the transport. Local delivery is returned to the
//! caller as [`RouteOutcome::DeliverLocally`] so the router never depends on
//! the dispatcher.

use std::sync::Arc;

use hyperpub_core::{PeerAddress, RoutingError, Transport, WireMessage, distance, neighbors};
use tracing::{debug, info, warn};

/// Result of a successful routing attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The target is this node; the caller must dispatch the payload
    DeliverLocally(WireMessage),
    /// A `route` envelope was written to `next_hop`
    Forwarded {
        /// The neighbor the envelope was sent to
        next_hop: PeerAddress,
    },
}

/// Greedy forwarding over a hypercube
pub struct HypercubeRouter<T: Transport> {
    /// Connection table used for reachability and sends
    transport: Arc<T>,
}

impl<T: Transport> HypercubeRouter<T> {
    /// Create a new router over a transport
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Address of the local node
    pub fn local_address(&self) -> PeerAddress {
        self.transport.local_address()
    }

    /// Get a reference to the transport
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Greedy next-hop decision
    ///
    /// Returns the first connected neighbor, in ascending bit-position order,
    /// strictly closer to `target` than this node. `None` when the target is
    /// this node or no such neighbor is connected.
    pub fn next_hop(&self, target: &PeerAddress) -> Result<Option<PeerAddress>, RoutingError> {
        let local = self.local_address();
        let current = distance(&local, target)?;
        if current == 0 {
            return Ok(None);
        }

        for neighbor in neighbors(&local) {
            if !self.transport.is_connected(&neighbor) {
                continue;
            }
            if distance(&neighbor, target)? < current {
                return Ok(Some(neighbor));
            }
        }
        Ok(None)
    }

    /// Route a payload toward `target`
    ///
    /// `path` holds the addresses the payload has already traversed; this
    /// node is appended before forwarding. Failure is logged here and
    /// returned so the originator can choose to call
    /// [`try_alternative_route`](Self::try_alternative_route).
    pub async fn route(
        &self,
        target: PeerAddress,
        payload: WireMessage,
        path: Vec<PeerAddress>,
    ) -> Result<RouteOutcome, RoutingError> {
        let local = self.local_address();

        if target == local {
            debug!(kind = payload.kind(), "Route target is local");
            return Ok(RouteOutcome::DeliverLocally(payload));
        }

        let Some(next_hop) = self.next_hop(&target)? else {
            warn!(
                target = %target,
                kind = payload.kind(),
                connected = self.transport.connection_count(),
                "Routing failed: no connected neighbor closer to target"
            );
            return Err(RoutingError::NoCloserNeighbor {
                target: target.to_string(),
            });
        };

        self.forward(next_hop, target, payload, path).await?;
        debug!(target = %target, next_hop = %next_hop, "Forwarded toward target");
        Ok(RouteOutcome::Forwarded { next_hop })
    }

    /// Last-resort forwarding after a primary failure
    ///
    /// Walks the same neighbor order as [`route`](Self::route) but accepts the
    /// first connected neighbor regardless of distance. A failed send moves
    /// on to the next connected neighbor.
    pub async fn try_alternative_route(
        &self,
        target: PeerAddress,
        payload: WireMessage,
        path: Vec<PeerAddress>,
    ) -> Result<RouteOutcome, RoutingError> {
        let local = self.local_address();
        if target == local {
            return Ok(RouteOutcome::DeliverLocally(payload));
        }
        // Reject width mismatches before touching the network
        distance(&local, &target)?;

        for neighbor in neighbors(&local) {
            if !self.transport.is_connected(&neighbor) {
                continue;
            }
            match self
                .forward(neighbor, target, payload.clone(), path.clone())
                .await
            {
                Ok(()) => {
                    info!(target = %target, via = %neighbor, "Using alternative route");
                    return Ok(RouteOutcome::Forwarded { next_hop: neighbor });
                }
                Err(e) => {
                    debug!(via = %neighbor, error = %e, "Alternative hop failed, trying next");
                }
            }
        }

        warn!(target = %target, "All routing attempts failed");
        Err(RoutingError::NoConnectedNeighbor {
            target: target.to_string(),
        })
    }

    async fn forward(
        &self,
        next_hop: PeerAddress,
        target: PeerAddress,
        payload: WireMessage,
        mut path: Vec<PeerAddress>,
    ) -> Result<(), RoutingError> {
        path.push(self.local_address());
        let envelope = WireMessage::route(target, payload, path);

        self.transport
            .send(&next_hop, &envelope)
            .await
            .map_err(|e| {
                warn!(next_hop = %next_hop, error = %e, "Failed to forward routed message");
                RoutingError::SendFailed {
                    next_hop: next_hop.to_string(),
                    reason: e.to_string(),
                }
            })
    }
}
