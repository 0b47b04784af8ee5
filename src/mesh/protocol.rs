//! Wire protocol of the mesh.
//!
//! Every published unit is `"<sender_id> <type_tag> <json_payload>"`. The
//! payload may itself contain spaces, so a unit is split at most twice.
//! Decoding is a two step affair: [`Envelope::parse`] recovers the three
//! fields, then [`decode`] turns the payload into a [`Message`] according to
//! its tag.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub use super::types::{MasterCandidate, NodeState};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("invalid {tag} payload: {source}")]
    Payload {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A message expecting a [`Response`] carrying the same id.
pub trait Request {
    fn request_id(&self) -> &str;
}

pub trait Response {
    fn request_id(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub node_state: NodeState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStateRequest {
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStateResponse {
    pub request_id: String,
    pub nodes: HashMap<String, NodeState>,
}

/// Vote for a candidate. The voter is the envelope sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterVote {
    pub node_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterElected {
    pub elected_node_id: String,
}

impl Request for ClusterStateRequest {
    fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Response for ClusterStateResponse {
    fn request_id(&self) -> &str {
        &self.request_id
    }
}

/// Closed set of messages exchanged between nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Heartbeat(Heartbeat),
    ClusterStateRequest(ClusterStateRequest),
    ClusterStateResponse(ClusterStateResponse),
    MasterCandidate(MasterCandidate),
    MasterVote(MasterVote),
    MasterElected(MasterElected),
}

impl Message {
    pub const HEARTBEAT: &'static str = "Heartbeat";
    pub const CLUSTER_STATE_REQUEST: &'static str = "ClusterStateRequest";
    pub const CLUSTER_STATE_RESPONSE: &'static str = "ClusterStateResponse";
    pub const MASTER_CANDIDATE: &'static str = "MasterCandidate";
    pub const MASTER_VOTE: &'static str = "MasterVote";
    pub const MASTER_ELECTED: &'static str = "MasterElected";

    pub fn heartbeat(node_state: NodeState) -> Self {
        Message::Heartbeat(Heartbeat { node_state })
    }

    pub fn vote(candidate_id: impl Into<String>) -> Self {
        Message::MasterVote(MasterVote {
            node_id: candidate_id.into(),
        })
    }

    pub fn elected(node_id: impl Into<String>) -> Self {
        Message::MasterElected(MasterElected {
            elected_node_id: node_id.into(),
        })
    }

    /// Wire tag of the message, the name of its variant.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Message::Heartbeat(_) => Self::HEARTBEAT,
            Message::ClusterStateRequest(_) => Self::CLUSTER_STATE_REQUEST,
            Message::ClusterStateResponse(_) => Self::CLUSTER_STATE_RESPONSE,
            Message::MasterCandidate(_) => Self::MASTER_CANDIDATE,
            Message::MasterVote(_) => Self::MASTER_VOTE,
            Message::MasterElected(_) => Self::MASTER_ELECTED,
        }
    }

    fn payload(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Message::Heartbeat(m) => serde_json::to_vec(m),
            Message::ClusterStateRequest(m) => serde_json::to_vec(m),
            Message::ClusterStateResponse(m) => serde_json::to_vec(m),
            Message::MasterCandidate(m) => serde_json::to_vec(m),
            Message::MasterVote(m) => serde_json::to_vec(m),
            Message::MasterElected(m) => serde_json::to_vec(m),
        }
    }
}

impl From<ClusterStateRequest> for Message {
    fn from(request: ClusterStateRequest) -> Self {
        Message::ClusterStateRequest(request)
    }
}

impl From<MasterCandidate> for Message {
    fn from(candidate: MasterCandidate) -> Self {
        Message::MasterCandidate(candidate)
    }
}

/// Unit carried by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub sender_id: String,
    pub type_tag: String,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn parse(raw: &[u8]) -> Result<Self, CodecError> {
        let mut parts = raw.splitn(3, |b| *b == b' ');
        let (sender, tag, payload) = match (parts.next(), parts.next(), parts.next()) {
            (Some(sender), Some(tag), Some(payload)) => (sender, tag, payload),
            _ => {
                return Err(CodecError::Malformed(format!(
                    "expected 3 space separated fields in {} bytes",
                    raw.len()
                )))
            }
        };

        let sender_id = std::str::from_utf8(sender)
            .map_err(|_| CodecError::Malformed("sender id is not valid UTF-8".to_string()))?;
        let type_tag = std::str::from_utf8(tag)
            .map_err(|_| CodecError::Malformed("type tag is not valid UTF-8".to_string()))?;
        if sender_id.is_empty() || type_tag.is_empty() {
            return Err(CodecError::Malformed("empty sender id or type tag".to_string()));
        }

        Ok(Self {
            sender_id: sender_id.to_string(),
            type_tag: type_tag.to_string(),
            payload: payload.to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(self.sender_id.len() + self.type_tag.len() + self.payload.len() + 2);
        bytes.extend_from_slice(self.sender_id.as_bytes());
        bytes.push(b' ');
        bytes.extend_from_slice(self.type_tag.as_bytes());
        bytes.push(b' ');
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// Wraps `message` into an envelope sent by `sender_id`.
pub fn encode(sender_id: &str, message: &Message) -> Result<Envelope, CodecError> {
    let payload = message.payload().map_err(|source| CodecError::Payload {
        tag: message.type_tag().to_string(),
        source,
    })?;

    Ok(Envelope {
        sender_id: sender_id.to_string(),
        type_tag: message.type_tag().to_string(),
        payload,
    })
}

pub fn decode(envelope: &Envelope) -> Result<Message, CodecError> {
    fn payload<T: for<'de> Deserialize<'de>>(envelope: &Envelope) -> Result<T, CodecError> {
        serde_json::from_slice(&envelope.payload).map_err(|source| CodecError::Payload {
            tag: envelope.type_tag.clone(),
            source,
        })
    }

    match envelope.type_tag.as_str() {
        Message::HEARTBEAT => payload(envelope).map(Message::Heartbeat),
        Message::CLUSTER_STATE_REQUEST => payload(envelope).map(Message::ClusterStateRequest),
        Message::CLUSTER_STATE_RESPONSE => payload(envelope).map(Message::ClusterStateResponse),
        Message::MASTER_CANDIDATE => payload(envelope).map(Message::MasterCandidate),
        Message::MASTER_VOTE => payload(envelope).map(Message::MasterVote),
        Message::MASTER_ELECTED => payload(envelope).map(Message::MasterElected),
        other => Err(CodecError::UnknownType(other.to_string())),
    }
}
