use common_net::{
    metrics,
    transport::{Channel, ChannelStatus, TransportError},
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::event::{ControlCommand, ControlEvent};
use crate::{Role, PLAYER_CONTROL_EVENT};

/// Source of the ordering timestamps stamped on outgoing events.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Where published events go. Implemented by transport channels.
pub trait BroadcastSink {
    fn status(&self) -> ChannelStatus;

    fn send_broadcast(&self, event: &str, payload: Value) -> Result<Option<u64>, TransportError>;
}

impl BroadcastSink for Channel {
    fn status(&self) -> ChannelStatus {
        Channel::status(self)
    }

    fn send_broadcast(&self, event: &str, payload: Value) -> Result<Option<u64>, TransportError> {
        Channel::send_broadcast(self, event, payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAdmin,
    ChannelNotJoined,
    DuplicateVideo,
    EncodeFailed,
    TransportFailed,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::NotAdmin => "not_admin",
            SkipReason::ChannelNotJoined => "channel_not_joined",
            SkipReason::DuplicateVideo => "duplicate_video",
            SkipReason::EncodeFailed => "encode_failed",
            SkipReason::TransportFailed => "transport_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    Sent(ControlEvent),
    Skipped(SkipReason),
}

impl PublishOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, PublishOutcome::Sent(_))
    }
}

/// Mirrors the admin's local player actions onto the match topic.
///
/// Publishing is best effort: every refusal or failure comes back as
/// [`PublishOutcome::Skipped`] and is only logged, never raised.
#[derive(Debug)]
pub struct AdminPublisher<C: Clock = SystemClock> {
    role: Role,
    clock: C,
    current_video_id: Option<String>,
    last_timestamp: u64,
}

impl AdminPublisher<SystemClock> {
    pub fn new(role: Role) -> Self {
        Self::with_clock(role, SystemClock)
    }
}

impl<C: Clock> AdminPublisher<C> {
    pub fn with_clock(role: Role, clock: C) -> Self {
        Self {
            role,
            clock,
            current_video_id: None,
            last_timestamp: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Seeds the video the admin's player already shows.
    pub fn track_video(&mut self, video_id: Option<String>) {
        self.current_video_id = video_id;
    }

    pub fn current_video_id(&self) -> Option<&str> {
        self.current_video_id.as_deref()
    }

    pub fn send_player_control_event<S>(&mut self, sink: &S, command: ControlCommand) -> PublishOutcome
    where
        S: BroadcastSink + ?Sized,
    {
        if !self.role.is_admin() {
            return self.skip(SkipReason::NotAdmin, &command);
        }
        if !sink.status().is_joined() {
            return self.skip(SkipReason::ChannelNotJoined, &command);
        }
        if let ControlCommand::LoadVideo { video_id } = &command {
            if self.current_video_id.as_deref() == Some(video_id.as_str()) {
                return self.skip(SkipReason::DuplicateVideo, &command);
            }
        }

        // Strictly increasing even when two events share a wall-clock millisecond.
        let timestamp = self.clock.now_millis().max(self.last_timestamp + 1);
        self.last_timestamp = timestamp;
        let event = ControlEvent::new(command, timestamp);

        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "publisher: cannot encode control event");
                return self.skip(SkipReason::EncodeFailed, event.command());
            }
        };

        if let Err(err) = sink.send_broadcast(PLAYER_CONTROL_EVENT, payload) {
            warn!(%err, kind = event.command().kind(), "publisher: broadcast failed");
            return self.skip(SkipReason::TransportFailed, event.command());
        }

        if let ControlCommand::LoadVideo { video_id } = event.command() {
            self.current_video_id = Some(video_id.clone());
        }
        metrics::sync_metrics().inc_published();
        debug!(kind = event.command().kind(), timestamp, "publisher: control event sent");
        PublishOutcome::Sent(event)
    }

    fn skip(&self, reason: SkipReason, command: &ControlCommand) -> PublishOutcome {
        debug!(
            reason = reason.as_str(),
            kind = command.kind(),
            "publisher: control event not sent"
        );
        PublishOutcome::Skipped(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_net::transport::TransportErrorKind;
    use std::cell::RefCell;

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> u64 {
            self.0
        }
    }

    struct RecordingSink {
        status: ChannelStatus,
        fail: bool,
        sent: RefCell<Vec<(String, Value)>>,
    }

    impl RecordingSink {
        fn joined() -> Self {
            Self::with_status(ChannelStatus::Joined)
        }

        fn with_status(status: ChannelStatus) -> Self {
            Self {
                status,
                fail: false,
                sent: RefCell::new(Vec::new()),
            }
        }

        fn sent(&self) -> usize {
            self.sent.borrow().len()
        }
    }

    impl BroadcastSink for RecordingSink {
        fn status(&self) -> ChannelStatus {
            self.status
        }

        fn send_broadcast(&self, event: &str, payload: Value) -> Result<Option<u64>, TransportError> {
            if self.fail {
                return Err(TransportError::new(TransportErrorKind::ConnectionClosed, "gone"));
            }
            self.sent.borrow_mut().push((event.to_string(), payload));
            Ok(None)
        }
    }

    fn load(video_id: &str) -> ControlCommand {
        ControlCommand::LoadVideo {
            video_id: video_id.into(),
        }
    }

    #[test]
    fn follower_role_never_publishes() {
        let sink = RecordingSink::joined();
        let mut publisher = AdminPublisher::with_clock(Role::Follower, FixedClock(10));

        let outcome = publisher.send_player_control_event(&sink, ControlCommand::Pause);

        assert_eq!(outcome, PublishOutcome::Skipped(SkipReason::NotAdmin));
        assert_eq!(sink.sent(), 0);
    }

    #[test]
    fn unjoined_channel_never_publishes() {
        for status in [
            ChannelStatus::Idle,
            ChannelStatus::Joining,
            ChannelStatus::ChannelError,
            ChannelStatus::TimedOut,
            ChannelStatus::Closed,
        ] {
            let sink = RecordingSink::with_status(status);
            let mut publisher = AdminPublisher::with_clock(Role::Admin, FixedClock(10));

            let outcome = publisher.send_player_control_event(&sink, ControlCommand::Pause);

            assert_eq!(outcome, PublishOutcome::Skipped(SkipReason::ChannelNotJoined));
            assert_eq!(sink.sent(), 0, "status {status:?}");
        }
    }

    #[test]
    fn sends_envelope_with_injected_timestamp() {
        let sink = RecordingSink::joined();
        let mut publisher = AdminPublisher::with_clock(Role::Admin, FixedClock(1_000));

        let outcome = publisher.send_player_control_event(
            &sink,
            ControlCommand::Seek {
                current_time: Some(12.0),
            },
        );

        assert!(outcome.is_sent());
        let sent = sink.sent.borrow();
        assert_eq!(sent[0].0, PLAYER_CONTROL_EVENT);
        assert_eq!(sent[0].1["type"], "SEEK");
        assert_eq!(sent[0].1["timestamp"], 1_000);
    }

    #[test]
    fn same_millisecond_events_still_increase() {
        let sink = RecordingSink::joined();
        let mut publisher = AdminPublisher::with_clock(Role::Admin, FixedClock(500));

        let first = publisher.send_player_control_event(
            &sink,
            ControlCommand::Seek {
                current_time: Some(3.0),
            },
        );
        let second = publisher.send_player_control_event(&sink, ControlCommand::Play { current_time: None });

        match (first, second) {
            (PublishOutcome::Sent(a), PublishOutcome::Sent(b)) => {
                assert_eq!(a.timestamp(), 500);
                assert_eq!(b.timestamp(), 501);
            }
            other => panic!("unexpected outcomes {other:?}"),
        }
    }

    #[test]
    fn repeated_load_of_tracked_video_is_suppressed() {
        let sink = RecordingSink::joined();
        let mut publisher = AdminPublisher::with_clock(Role::Admin, FixedClock(1));

        assert!(publisher.send_player_control_event(&sink, load("abc")).is_sent());
        assert_eq!(publisher.current_video_id(), Some("abc"));
        assert_eq!(
            publisher.send_player_control_event(&sink, load("abc")),
            PublishOutcome::Skipped(SkipReason::DuplicateVideo)
        );
        assert!(publisher.send_player_control_event(&sink, load("xyz")).is_sent());
        assert_eq!(sink.sent(), 2);
    }

    #[test]
    fn seeded_video_counts_as_tracked() {
        let sink = RecordingSink::joined();
        let mut publisher = AdminPublisher::with_clock(Role::Admin, FixedClock(1));
        publisher.track_video(Some("abc".into()));

        assert_eq!(
            publisher.send_player_control_event(&sink, load("abc")),
            PublishOutcome::Skipped(SkipReason::DuplicateVideo)
        );
        assert_eq!(sink.sent(), 0);
    }

    #[test]
    fn transport_failure_is_swallowed_and_keeps_tracked_video() {
        let mut sink = RecordingSink::joined();
        sink.fail = true;
        let mut publisher = AdminPublisher::with_clock(Role::Admin, FixedClock(1));

        assert_eq!(
            publisher.send_player_control_event(&sink, load("abc")),
            PublishOutcome::Skipped(SkipReason::TransportFailed)
        );
        assert_eq!(publisher.current_video_id(), None);
    }
}
