use serde::{Deserialize, Serialize};

/// Per-channel options sent with a join.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelConfig {
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Ask the relay to confirm every broadcast carrying a `ref`.
    #[serde(default)]
    pub ack: bool,
    /// Deliver our own broadcasts back to us.
    #[serde(default, rename = "self")]
    pub self_echo: bool,
}

impl ChannelConfig {
    pub fn new(ack: bool, self_echo: bool) -> Self {
        Self {
            broadcast: BroadcastConfig { ack, self_echo },
        }
    }
}

/// Frames sent by a client to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Join {
        topic: String,
        #[serde(default)]
        config: ChannelConfig,
        #[serde(rename = "ref")]
        reference: u64,
    },
    Leave {
        topic: String,
        #[serde(rename = "ref")]
        reference: u64,
    },
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
        #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
        reference: Option<u64>,
    },
    Heartbeat {
        #[serde(rename = "ref")]
        reference: u64,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// Frames pushed by the relay to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    JoinReply {
        topic: String,
        #[serde(rename = "ref")]
        reference: u64,
        status: ReplyStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    Ack {
        topic: String,
        #[serde(rename = "ref")]
        reference: u64,
    },
    HeartbeatReply {
        #[serde(rename = "ref")]
        reference: u64,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        reason: String,
    },
}

impl ServerFrame {
    pub fn join_ok(topic: impl Into<String>, reference: u64) -> Self {
        Self::JoinReply {
            topic: topic.into(),
            reference,
            status: ReplyStatus::Ok,
            reason: None,
        }
    }

    pub fn join_error(topic: impl Into<String>, reference: u64, reason: impl Into<String>) -> Self {
        Self::JoinReply {
            topic: topic.into(),
            reference,
            status: ReplyStatus::Error,
            reason: Some(reason.into()),
        }
    }

    pub fn error(topic: Option<String>, reason: impl Into<String>) -> Self {
        Self::Error {
            topic,
            reason: reason.into(),
        }
    }
}

/// A broadcast as seen by a subscribed channel.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastMessage {
    pub event: String,
    pub payload: serde_json::Value,
}

pub fn encode_client(frame: &ClientFrame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

pub fn decode_client(bytes: &[u8]) -> Result<ClientFrame, serde_json::Error> {
    serde_json::from_slice(bytes)
}

pub fn encode_server(frame: &ServerFrame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

pub fn decode_server(bytes: &[u8]) -> Result<ServerFrame, serde_json::Error> {
    serde_json::from_slice(bytes)
}
