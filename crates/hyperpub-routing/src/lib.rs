//! # Hyperpub Routing
//!
//! Greedy forwarding over the hypercube.
//!
//! ## Routing Algorithm
//!
//! 1. **LOCAL**: if the target is this node, hand the payload back for local
//!    dispatch; nothing is sent
//! 2. **GREEDY**: otherwise walk the neighbors in ascending bit-position order
//!    and forward to the first *connected* neighbor strictly closer (by
//!    Hamming distance) to the target
//! 3. **FAIL**: if no such neighbor exists, the attempt fails and is logged
//!
//! Each forward is a single send with no acknowledgment or retry. On a fully
//! connected cube every hop lowers the distance by one, so a message arrives
//! in exactly `distance(source, target)` hops. With partial connectivity,
//! delivery is not guaranteed.
//!
//! ## Alternative Route
//!
//! [`HypercubeRouter::try_alternative_route`] is an escape valve for the
//! originator after a primary failure: it forwards to the first connected
//! neighbor whatever its distance. It may move the message *away* from the
//! target. It is best-effort, not a correctness-preserving retry.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hyperpub_routing::{HypercubeRouter, RouteOutcome};
//!
//! let router = HypercubeRouter::new(transport);
//! match router.route(target, payload, Vec::new()).await {
//!     Ok(RouteOutcome::DeliverLocally(payload)) => { /* dispatch */ }
//!     Ok(RouteOutcome::Forwarded { next_hop }) => { /* sent */ }
//!     Err(e) => { /* maybe try_alternative_route */ }
//! }
//! ```

pub mod router;

// Re-export main types
pub use router::{HypercubeRouter, RouteOutcome};

// Re-export core routing types for convenience
pub use hyperpub_core::RoutingError;
