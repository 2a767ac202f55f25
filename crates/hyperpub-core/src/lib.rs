//! # Hyperpub Core
//!
//! Core types, topology functions, wire messages and errors shared by every
//! layer of the Hyperpub overlay.
//!
//! Nodes are addressed by fixed-width bit strings arranged as a hypercube:
//! two nodes are neighbors when their addresses differ in exactly one bit.
//! Topic directories are replicated by explicit `topic_sync` broadcasts,
//! not by consensus.
//!
//! ## Key Types
//!
//! - [`PeerAddress`]: k-bit node address (`"010"`)
//! - [`TopicKey`]: content hash of a topic name
//! - [`WireMessage`]: closed sum type over the six protocol variants
//! - [`Handshake`]: first frame on every new stream
//!
//! ## Key Traits
//!
//! - [`Transport`]: send to a connected peer, query the connection table
//! - [`BroadcastTransport`]: best-effort fan-out over every connection

pub mod error;
pub mod identity;
pub mod message;
pub mod mock_transport;
pub mod topic;
pub mod topology;
pub mod transport;

// Re-export main types
pub use error::*;
pub use identity::*;
pub use message::*;
pub use mock_transport::*;
pub use topic::*;
pub use topology::*;
pub use transport::*;
