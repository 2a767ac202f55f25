//! Wire messages
//!
//! Every frame body is a UTF-8 JSON object distinguished by its `type` field.
//! [`WireMessage`] is the closed set of variants a node dispatches;
//! [`Handshake`] is only ever the first frame on a new stream.
//!
//! Decoding is two-step so that an unrecognised `type` is reported as
//! [`ProtocolError::UnknownMessageType`] rather than a generic shape error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::identity::PeerAddress;

/// `type` values accepted by [`WireMessage::from_json`]
pub const MESSAGE_TYPES: [&str; 6] = [
    "route",
    "topic_sync",
    "delete_topic",
    "message",
    "subscribe",
    "list_topics",
];

/// Message types for the overlay protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// A payload travelling toward `target` by greedy forwarding
    Route {
        target: PeerAddress,
        data: Box<WireMessage>,
        /// Addresses already traversed (diagnostic only)
        path: Vec<PeerAddress>,
    },
    /// Topic names the sender knows about
    TopicSync { topics: Vec<String> },
    /// Topics the sender deleted
    DeleteTopic { topics: Vec<String> },
    /// A message published to a topic
    #[serde(rename = "message")]
    Publish { topic: String, message: String },
    /// A peer subscribed to a topic
    Subscribe {
        topic: String,
        subscriber: PeerAddress,
    },
    /// Request for the topic names known at the receiving node
    ListTopics { requesting_peer: PeerAddress },
}

impl WireMessage {
    /// Wrap a payload in a routing envelope
    pub fn route(target: PeerAddress, data: WireMessage, path: Vec<PeerAddress>) -> Self {
        Self::Route {
            target,
            data: Box::new(data),
            path,
        }
    }

    /// The wire `type` of this message
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Route { .. } => "route",
            Self::TopicSync { .. } => "topic_sync",
            Self::DeleteTopic { .. } => "delete_topic",
            Self::Publish { .. } => "message",
            Self::Subscribe { .. } => "subscribe",
            Self::ListTopics { .. } => "list_topics",
        }
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode and validate a JSON frame body
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::InvalidMessageFormat(e.to_string()))?;

        let kind = value
            .get("type")
            .ok_or(ProtocolError::MissingType)?
            .as_str()
            .ok_or_else(|| ProtocolError::InvalidField("type must be a string".into()))?;

        if !MESSAGE_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownMessageType(kind.to_string()));
        }

        let message: WireMessage =
            serde_json::from_value(value).map_err(|e| ProtocolError::InvalidField(e.to_string()))?;
        message.validate()?;
        Ok(message)
    }

    /// Check required-field content that the type system cannot express
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::Route { target, data, path } => {
                if path.iter().any(|hop| hop.width() != target.width()) {
                    return Err(ProtocolError::InvalidField(
                        "route path width differs from target".into(),
                    ));
                }
                data.validate()
            }
            Self::TopicSync { topics } | Self::DeleteTopic { topics } => {
                if topics.iter().any(|t| t.is_empty()) {
                    return Err(ProtocolError::InvalidField("empty topic name".into()));
                }
                Ok(())
            }
            Self::Publish { topic, message } => {
                if topic.is_empty() {
                    return Err(ProtocolError::InvalidField("empty topic name".into()));
                }
                if message.is_empty() {
                    return Err(ProtocolError::InvalidField("empty message".into()));
                }
                Ok(())
            }
            Self::Subscribe { topic, .. } => {
                if topic.is_empty() {
                    return Err(ProtocolError::InvalidField("empty topic name".into()));
                }
                Ok(())
            }
            Self::ListTopics { .. } => Ok(()),
        }
    }
}

/// First frame on every new stream, identifying the dialer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    /// Address of the node that opened the stream
    pub address: PeerAddress,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HandshakeFrame {
    Hello { address: PeerAddress },
}

impl Handshake {
    /// Create a handshake for the given local address
    pub fn new(address: PeerAddress) -> Self {
        Self { address }
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(&HandshakeFrame::Hello {
            address: self.address,
        })
        .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode a handshake frame body
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let HandshakeFrame::Hello { address } = serde_json::from_str(text)
            .map_err(|e| ProtocolError::HandshakeFailed(e.to_string()))?;
        Ok(Self { address })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> PeerAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_wire_names() {
        let msg = WireMessage::Publish {
            topic: "T1".into(),
            message: "hello".into(),
        };
        let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["topic"], "T1");
        assert_eq!(json["message"], "hello");
        assert_eq!(msg.kind(), "message");

        let msg = WireMessage::ListTopics {
            requesting_peer: addr("011"),
        };
        let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "list_topics");
        assert_eq!(json["requesting_peer"], "011");
    }

    #[test]
    fn test_decode_reference_frames() {
        let msg = WireMessage::from_json(r#"{"type":"topic_sync","topics":["T1","T2"]}"#).unwrap();
        assert_eq!(
            msg,
            WireMessage::TopicSync {
                topics: vec!["T1".into(), "T2".into()]
            }
        );

        let msg = WireMessage::from_json(
            r#"{"type":"route","target":"111","path":["000"],
                "data":{"type":"subscribe","topic":"T1","subscriber":"000"}}"#,
        )
        .unwrap();
        match msg {
            WireMessage::Route { target, data, path } => {
                assert_eq!(target, addr("111"));
                assert_eq!(path, vec![addr("000")]);
                assert_eq!(data.kind(), "subscribe");
            }
            other => panic!("expected route, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_distinct() {
        assert_eq!(
            WireMessage::from_json(r#"{"type":"gossip","x":1}"#),
            Err(ProtocolError::UnknownMessageType("gossip".into()))
        );
        assert_eq!(
            WireMessage::from_json(r#"{"topics":[]}"#),
            Err(ProtocolError::MissingType)
        );
    }

    #[test]
    fn test_missing_and_malformed_fields() {
        assert!(matches!(
            WireMessage::from_json(r#"{"type":"message","topic":"T1"}"#),
            Err(ProtocolError::InvalidField(_))
        ));
        assert!(matches!(
            WireMessage::from_json(r#"{"type":"subscribe","topic":"T1","subscriber":"0x1"}"#),
            Err(ProtocolError::InvalidField(_))
        ));
        assert!(matches!(
            WireMessage::from_json(r#"{"type":"message","topic":"","message":"m"}"#),
            Err(ProtocolError::InvalidField(_))
        ));
        assert!(matches!(
            WireMessage::from_json("{not json"),
            Err(ProtocolError::InvalidMessageFormat(_))
        ));
    }

    #[test]
    fn test_nested_route_is_validated() {
        let result = WireMessage::from_json(
            r#"{"type":"route","target":"111","path":[],
                "data":{"type":"message","topic":"T1","message":""}}"#,
        );
        assert!(matches!(result, Err(ProtocolError::InvalidField(_))));

        let result = WireMessage::from_json(
            r#"{"type":"route","target":"111","path":["00"],
                "data":{"type":"topic_sync","topics":[]}}"#,
        );
        assert!(matches!(result, Err(ProtocolError::InvalidField(_))));
    }

    #[test]
    fn test_handshake() {
        let hello = Handshake::new(addr("101"));
        let json = hello.to_json().unwrap();
        assert_eq!(json, r#"{"type":"hello","address":"101"}"#);
        assert_eq!(Handshake::from_json(&json).unwrap(), hello);

        assert!(matches!(
            Handshake::from_json(r#"{"type":"topic_sync","topics":[]}"#),
            Err(ProtocolError::HandshakeFailed(_))
        ));
    }
}
