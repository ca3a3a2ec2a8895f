//! Shared video player control over a realtime broadcast relay.
//!
//! One admin publishes `PLAY`/`PAUSE`/`SEEK`/`LOAD_VIDEO` events on the
//! match topic; followers apply them to their own player, dropping anything
//! older than what they already applied.

use std::fmt;
use std::str::FromStr;

pub mod event;
pub mod player;
pub mod publisher;
pub mod session;
pub mod settings;
pub mod subscriber;

pub use event::{CodecError, ControlCommand, ControlEvent};
pub use player::{PlayerAdapter, PlayerCall, SimulatedPlayer};
pub use publisher::{AdminPublisher, BroadcastSink, Clock, PublishOutcome, SkipReason, SystemClock};
pub use session::SyncSession;
pub use settings::SyncSettings;
pub use subscriber::{ApplyOutcome, FollowerSubscriber, IgnoreReason, SubscriberState};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Broadcast event name carrying control events.
pub const PLAYER_CONTROL_EVENT: &str = "player-control";

pub fn topic_for_match(match_id: &str) -> String {
    format!("video-control-{match_id}")
}

/// Who controls playback. Passed in explicitly instead of read from app state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Follower,
}

impl Role {
    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::Follower => f.write_str("follower"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "follower" | "tracker" => Ok(Role::Follower),
            other => Err(format!("unknown role {other:?}, expected admin or follower")),
        }
    }
}
