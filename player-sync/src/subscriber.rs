use common_net::metrics;
use serde_json::Value;
use tracing::{debug, warn};

use crate::event::{ControlCommand, ControlEvent};
use crate::player::{self, PlayerAdapter};
use crate::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Unsubscribed,
    Subscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotSubscribed,
    OwnRole,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied,
    /// Timestamp not newer than the last applied one.
    Discarded { timestamp: u64, last_applied: u64 },
    Ignored(IgnoreReason),
    Rejected(String),
}

/// Applies inbound control events to the local player.
///
/// Holds the only per-follower state of the relay: the timestamp of the last
/// applied event and the video id it last switched to. Both live for one
/// subscription and are dropped on unsubscribe.
#[derive(Debug)]
pub struct FollowerSubscriber {
    role: Role,
    state: SubscriberState,
    last_applied_timestamp: u64,
    current_video_id: Option<String>,
}

impl FollowerSubscriber {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: SubscriberState::Unsubscribed,
            last_applied_timestamp: 0,
            current_video_id: None,
        }
    }

    pub fn state(&self) -> SubscriberState {
        self.state
    }

    pub fn last_applied_timestamp(&self) -> u64 {
        self.last_applied_timestamp
    }

    pub fn current_video_id(&self) -> Option<&str> {
        self.current_video_id.as_deref()
    }

    /// `loaded_video` is whatever the local player shows at mount time.
    pub fn subscribe(&mut self, loaded_video: Option<String>) {
        self.state = SubscriberState::Subscribed;
        self.last_applied_timestamp = 0;
        self.current_video_id = loaded_video;
    }

    pub fn unsubscribe(&mut self) {
        self.state = SubscriberState::Unsubscribed;
        self.last_applied_timestamp = 0;
        self.current_video_id = None;
    }

    pub fn handle_payload<P>(&mut self, payload: &Value, player: &mut P) -> ApplyOutcome
    where
        P: PlayerAdapter + ?Sized,
    {
        match ControlEvent::from_payload(payload) {
            Ok(event) => self.handle_event(&event, player),
            Err(err) => {
                warn!(%err, "subscriber: dropping malformed control event");
                metrics::sync_metrics().inc_discarded("malformed");
                ApplyOutcome::Rejected(err.to_string())
            }
        }
    }

    pub fn handle_event<P>(&mut self, event: &ControlEvent, player: &mut P) -> ApplyOutcome
    where
        P: PlayerAdapter + ?Sized,
    {
        if self.state != SubscriberState::Subscribed {
            return ApplyOutcome::Ignored(IgnoreReason::NotSubscribed);
        }
        if self.role.is_admin() {
            return ApplyOutcome::Ignored(IgnoreReason::OwnRole);
        }

        let timestamp = event.timestamp();
        if timestamp <= self.last_applied_timestamp {
            debug!(
                kind = event.command().kind(),
                timestamp,
                last_applied = self.last_applied_timestamp,
                "subscriber: stale or duplicate control event discarded"
            );
            metrics::sync_metrics().inc_discarded("stale");
            return ApplyOutcome::Discarded {
                timestamp,
                last_applied: self.last_applied_timestamp,
            };
        }
        self.last_applied_timestamp = timestamp;

        match event.command() {
            ControlCommand::LoadVideo { video_id }
                if self.current_video_id.as_deref() == Some(video_id.as_str()) =>
            {
                debug!(%video_id, "subscriber: video already loaded");
            }
            ControlCommand::LoadVideo { video_id } => {
                player::drive(player, event.command());
                self.current_video_id = Some(video_id.clone());
            }
            command => player::drive(player, command),
        }

        metrics::sync_metrics().inc_applied();
        debug!(kind = event.command().kind(), timestamp, "subscriber: control event applied");
        ApplyOutcome::Applied
    }
}
