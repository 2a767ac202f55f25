//! Error types for the peer node

use thiserror::Error;

use hyperpub_core::{
    AddressError, ProtocolError, RoutingError, StateError, TransportError, ValidationError,
};

/// Errors that can occur in node operations
#[derive(Debug, Error)]
pub enum NodeError {
    /// Malformed address, port or user input
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Frame or message shape error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// No viable next hop
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// Operation rejected by topic or subscription state
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Node not started
    #[error("Node not started")]
    NotStarted,

    /// Node already started
    #[error("Node already started")]
    AlreadyStarted,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<AddressError> for NodeError {
    fn from(e: AddressError) -> Self {
        NodeError::Validation(ValidationError::Address(e))
    }
}

/// Result type alias for node operations
pub type NodeResult<T> = Result<T, NodeError>;
