//! Player control events and their wire shape:
//! `{ type: 'PLAY'|'PAUSE'|'SEEK'|'LOAD_VIDEO', videoId?, currentTime?, timestamp }`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("control event has no type")]
    MissingType,
    #[error("unknown control event type {0:?}")]
    UnknownType(String),
    #[error("malformed control event: {0}")]
    Malformed(String),
}

/// What the follower's player should do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlCommand {
    Play {
        #[serde(rename = "currentTime", default, skip_serializing_if = "Option::is_none")]
        current_time: Option<f64>,
    },
    Pause,
    Seek {
        #[serde(rename = "currentTime", default, skip_serializing_if = "Option::is_none")]
        current_time: Option<f64>,
    },
    LoadVideo {
        #[serde(rename = "videoId")]
        video_id: String,
    },
}

impl ControlCommand {
    pub const TYPES: [&'static str; 4] = ["PLAY", "PAUSE", "SEEK", "LOAD_VIDEO"];

    pub fn kind(&self) -> &'static str {
        match self {
            ControlCommand::Play { .. } => "PLAY",
            ControlCommand::Pause => "PAUSE",
            ControlCommand::Seek { .. } => "SEEK",
            ControlCommand::LoadVideo { .. } => "LOAD_VIDEO",
        }
    }
}

/// Parses the console form: `play [seconds]`, `pause`, `seek <seconds>`,
/// `load <video id>`.
impl FromStr for ControlCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or_else(|| "empty command".to_string())?;
        let argument = parts.next();
        if parts.next().is_some() {
            return Err(format!("too many arguments in {line:?}"));
        }

        let seconds = |raw: &str| -> Result<f64, String> {
            raw.parse::<f64>()
                .ok()
                .filter(|value| value.is_finite() && *value >= 0.0)
                .ok_or_else(|| format!("invalid position {raw:?}"))
        };

        match (verb.to_ascii_lowercase().as_str(), argument) {
            ("play", None) => Ok(ControlCommand::Play { current_time: None }),
            ("play", Some(raw)) => Ok(ControlCommand::Play {
                current_time: Some(seconds(raw)?),
            }),
            ("pause", None) => Ok(ControlCommand::Pause),
            ("seek", Some(raw)) => Ok(ControlCommand::Seek {
                current_time: Some(seconds(raw)?),
            }),
            ("load", Some(video_id)) => Ok(ControlCommand::LoadVideo {
                video_id: video_id.to_string(),
            }),
            _ => Err(format!("cannot parse command {line:?}")),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireEvent {
    #[serde(flatten)]
    command: ControlCommand,
    timestamp: u64,
}

/// A timestamped command. Immutable once built; the timestamp is only an
/// ordering token and is assigned by the publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlEvent {
    command: ControlCommand,
    timestamp: u64,
}

impl ControlEvent {
    pub fn new(command: ControlCommand, timestamp: u64) -> Self {
        Self { command, timestamp }
    }

    pub fn command(&self) -> &ControlCommand {
        &self.command
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn to_payload(&self) -> Result<Value, CodecError> {
        serde_json::to_value(WireEvent {
            command: self.command.clone(),
            timestamp: self.timestamp,
        })
        .map_err(|err| CodecError::Malformed(err.to_string()))
    }

    /// Decodes a broadcast payload without trusting its shape.
    pub fn from_payload(payload: &Value) -> Result<Self, CodecError> {
        let kind = match payload.get("type") {
            None | Some(Value::Null) => return Err(CodecError::MissingType),
            Some(Value::String(kind)) => kind.as_str(),
            Some(other) => return Err(CodecError::UnknownType(other.to_string())),
        };
        if !ControlCommand::TYPES.contains(&kind) {
            return Err(CodecError::UnknownType(kind.to_string()));
        }

        let wire: WireEvent = serde_json::from_value(payload.clone())
            .map_err(|err| CodecError::Malformed(err.to_string()))?;
        Ok(Self::new(wire.command, wire.timestamp))
    }
}
