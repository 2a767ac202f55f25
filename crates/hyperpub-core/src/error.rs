//! Error types for Hyperpub

use thiserror::Error;

/// Top-level error type for Hyperpub
#[derive(Debug, Error)]
pub enum HyperpubError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("State error: {0}")]
    State(#[from] StateError),
}

/// Errors related to peer addresses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error(
        "Invalid address width: {0} (expected 1..={max})",
        max = crate::identity::MAX_ADDRESS_WIDTH
    )]
    InvalidWidth(usize),

    #[error("Invalid character {character:?} at position {position} (expected '0' or '1')")]
    InvalidCharacter { character: char, position: usize },

    #[error("Address length mismatch: {left} vs {right} bits")]
    LengthMismatch { left: usize, right: usize },
}

/// Errors for malformed user or bootstrap input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid address: {0}")]
    Address(#[from] AddressError),

    #[error("Invalid port: {0} (expected 1-65535)")]
    InvalidPort(String),

    #[error("Topic name must not be empty")]
    EmptyTopic,

    #[error("Message must not be empty")]
    EmptyMessage,
}

/// Errors related to frame decoding and message shape
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Insufficient data: need {needed} bytes, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("Missing message type")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors related to peer links
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Peer not connected: {0}")]
    PeerNotConnected(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to hypercube routing
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("No connected neighbor strictly closer to {target}")]
    NoCloserNeighbor { target: String },

    #[error("No connected neighbor to route toward {target}")]
    NoConnectedNeighbor { target: String },

    #[error("Forwarding to {next_hop} failed: {reason}")]
    SendFailed { next_hop: String, reason: String },

    #[error("Address error: {0}")]
    Address(#[from] AddressError),
}

/// Errors for operations on topics that do or do not exist
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Topic already exists: {0}")]
    TopicExists(String),

    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Not subscribed to topic: {0}")]
    NotSubscribed(String),

    #[error("Already subscribed to topic: {0}")]
    AlreadySubscribed(String),
}
