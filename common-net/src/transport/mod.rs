//! Realtime channel transport.
//!
//! A [`Connector`] opens a [`Connection`], which multiplexes any number of
//! topic [`Channel`]s over one frame pipe. The pipe is either the in-process
//! [`BroadcastHub`](crate::hub::BroadcastHub) or a WebSocket to the gateway.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod connection;
pub mod memory;
pub mod ws;

pub use connection::{Channel, Connection};
pub use memory::MemoryConnector;
pub use ws::WsConnector;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Memory,
    WebSocket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Io,
    EncodingFailure,
    DecodingFailure,
    ConnectionClosed,
    NotJoined,
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Lifecycle of a single topic subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Idle,
    Joining,
    Joined,
    ChannelError,
    TimedOut,
    Closed,
}

impl ChannelStatus {
    pub fn is_joined(self) -> bool {
        self == ChannelStatus::Joined
    }

    /// Anything but a pending join.
    pub fn is_settled(self) -> bool {
        self != ChannelStatus::Joining
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub join_timeout: Duration,
    pub heartbeat_interval: Option<Duration>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_secs(10),
            heartbeat_interval: Some(Duration::from_secs(30)),
        }
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn connect(&self, settings: ConnectionSettings) -> Result<Connection, TransportError>;
}
