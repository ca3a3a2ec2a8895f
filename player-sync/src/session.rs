use common_net::{
    shutdown::{self, ShutdownReceiver},
    transport::{Channel, ChannelStatus, Connection},
};
use tracing::{debug, info, warn};

use crate::event::ControlCommand;
use crate::player::{self, PlayerAdapter};
use crate::publisher::{AdminPublisher, Clock, PublishOutcome, SystemClock};
use crate::settings::SyncSettings;
use crate::subscriber::{ApplyOutcome, FollowerSubscriber};
use crate::{topic_for_match, Role, PLAYER_CONTROL_EVENT};

/// Who is mounting and what their player shows.
#[derive(Debug, Clone)]
pub struct MatchContext {
    pub match_id: String,
    pub role: Role,
    pub loaded_video: Option<String>,
}

impl MatchContext {
    pub fn new(match_id: impl Into<String>, role: Role) -> Self {
        Self {
            match_id: match_id.into(),
            role,
            loaded_video: None,
        }
    }

    pub fn with_video(mut self, video_id: impl Into<String>) -> Self {
        self.loaded_video = Some(video_id.into());
        self
    }
}

/// A player attached to its match's control topic for the lifetime of one
/// mount. Dropping or [`unmount`](Self::unmount)ing it leaves the topic and
/// forgets all ordering state.
pub struct SyncSession<P: PlayerAdapter, C: Clock = SystemClock> {
    context: MatchContext,
    channel: Channel,
    publisher: AdminPublisher<C>,
    subscriber: FollowerSubscriber,
    player: P,
}

impl<P: PlayerAdapter> SyncSession<P, SystemClock> {
    pub async fn mount(
        connection: &Connection,
        settings: &SyncSettings,
        context: MatchContext,
        player: P,
    ) -> Self {
        Self::mount_with_clock(connection, settings, context, player, SystemClock).await
    }
}

impl<P: PlayerAdapter, C: Clock> SyncSession<P, C> {
    /// Joins the match topic and waits for the join outcome. A failed join is
    /// logged and leaves the session unsynchronized; nothing retries.
    pub async fn mount_with_clock(
        connection: &Connection,
        settings: &SyncSettings,
        context: MatchContext,
        player: P,
        clock: C,
    ) -> Self {
        let topic = topic_for_match(&context.match_id);
        let mut channel = connection.channel(topic.clone(), settings.channel_config());

        let mut publisher = AdminPublisher::with_clock(context.role, clock);
        publisher.track_video(context.loaded_video.clone());
        let mut subscriber = FollowerSubscriber::new(context.role);
        subscriber.subscribe(context.loaded_video.clone());

        if let Err(err) = channel.subscribe() {
            warn!(%err, %topic, "sync: subscribe failed");
        }
        match channel.wait_until_settled().await {
            ChannelStatus::Joined => {
                info!(%topic, role = %context.role, "sync: session mounted");
            }
            status => {
                warn!(%topic, ?status, "sync: channel not joined, playback stays unsynchronized");
            }
        }

        Self {
            context,
            channel,
            publisher,
            subscriber,
            player,
        }
    }

    pub fn context(&self) -> &MatchContext {
        &self.context
    }

    pub fn role(&self) -> Role {
        self.context.role
    }

    pub fn topic(&self) -> &str {
        self.channel.topic()
    }

    pub fn status(&self) -> ChannelStatus {
        self.channel.status()
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    pub fn subscriber(&self) -> &FollowerSubscriber {
        &self.subscriber
    }

    pub fn publisher(&self) -> &AdminPublisher<C> {
        &self.publisher
    }

    /// Broadcasts a command the local player already carried out.
    pub fn publish(&mut self, command: ControlCommand) -> PublishOutcome {
        self.publisher
            .send_player_control_event(&self.channel, command)
    }

    /// Carries out `command` on the local player, then broadcasts it.
    pub fn perform(&mut self, command: ControlCommand) -> PublishOutcome {
        let already_loaded = matches!(
            &command,
            ControlCommand::LoadVideo { video_id }
                if self.publisher.current_video_id() == Some(video_id.as_str())
        );
        if !already_loaded {
            player::drive(&mut self.player, &command);
        }
        self.publish(command)
    }

    /// Waits for the next `player-control` broadcast and applies it. `None`
    /// once the channel is gone.
    pub async fn next_inbound(&mut self) -> Option<ApplyOutcome> {
        loop {
            let message = self.channel.recv().await?;
            if message.event != PLAYER_CONTROL_EVENT {
                debug!(event = %message.event, "sync: ignoring unrelated broadcast");
                continue;
            }
            return Some(
                self.subscriber
                    .handle_payload(&message.payload, &mut self.player),
            );
        }
    }

    /// Applies inbound events until shutdown or channel loss, then unmounts.
    pub async fn run(mut self, shutdown_rx: ShutdownReceiver) -> P {
        let shutdown = shutdown::wait(shutdown_rx);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!(topic = %self.topic(), "sync: shutdown requested");
                    break;
                }
                outcome = self.next_inbound() => match outcome {
                    Some(outcome) => debug!(?outcome, "sync: inbound handled"),
                    None => {
                        warn!(topic = %self.topic(), "sync: channel closed");
                        break;
                    }
                },
            }
        }

        self.unmount()
    }

    pub fn unmount(self) -> P {
        let SyncSession {
            context,
            mut channel,
            mut subscriber,
            player,
            ..
        } = self;
        channel.unsubscribe();
        subscriber.unsubscribe();
        info!(match_id = %context.match_id, "sync: session unmounted");
        player
    }
}
