//! # Hyperpub Transport
//!
//! TCP links between hypercube neighbors.
//!
//! ## Features
//!
//! - Length-prefixed UTF-8 JSON framing with a 1 MiB frame cap
//! - A `hello` handshake naming the dialer's address on every stream
//! - One registered link per peer with FIFO sends
//! - A single inbox receiving decoded frames from every stream
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hyperpub_transport::{ConnectionFabric, InboundMessage};
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::channel::<InboundMessage>(1024);
//! let fabric = Arc::new(ConnectionFabric::new("000".parse()?, tx));
//!
//! let listener = ConnectionFabric::bind("127.0.0.1:8000").await?;
//! fabric.spawn_acceptor(listener);
//!
//! fabric.connect("100".parse()?, "127.0.0.1:8004").await?;
//! while let Some(inbound) = rx.recv().await {
//!     println!("{} sent {:?}", inbound.from, inbound.message);
//! }
//! ```

pub mod codec;
pub mod fabric;

// Re-export main types
pub use codec::{
    LENGTH_PREFIX_LEN, MAX_FRAME_SIZE, decode_frame, encode_frame, encode_message, read_frame,
    write_frame,
};
pub use fabric::{ConnectionFabric, ConnectionStats, InboundMessage, LinkDirection, PeerLink};

// Re-export core transport types for convenience
pub use hyperpub_core::{Transport, TransportError};
