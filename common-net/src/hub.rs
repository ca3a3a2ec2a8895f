use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::message::{ChannelConfig, ClientFrame, ServerFrame};
use crate::metrics;

pub type PeerSender = mpsc::UnboundedSender<ServerFrame>;
pub type PeerReceiver = mpsc::UnboundedReceiver<ServerFrame>;

#[derive(Debug, Default)]
struct HubState {
    peers: HashMap<String, PeerSender>,
    // topic -> peer_id -> config used at join time
    topics: HashMap<String, HashMap<String, ChannelConfig>>,
}

/// Topic registry relaying broadcasts between connected peers.
///
/// Shared by the WebSocket gateway and the in-process transport, so both
/// observe the same join/broadcast/ack rules.
#[derive(Debug, Default)]
pub struct BroadcastHub {
    state: RwLock<HubState>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self) -> (String, PeerReceiver) {
        let peer_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.write().await;
        state.peers.insert(peer_id.clone(), tx);
        metrics::relay_metrics().set_connections(state.peers.len() as i64);
        debug!(%peer_id, "hub: peer registered");
        (peer_id, rx)
    }

    pub async fn unregister(&self, peer_id: &str) {
        let mut state = self.state.write().await;
        state.peers.remove(peer_id);
        state.topics.retain(|_, members| {
            members.remove(peer_id);
            !members.is_empty()
        });
        metrics::relay_metrics().set_connections(state.peers.len() as i64);
        debug!(%peer_id, "hub: peer unregistered");
    }

    pub async fn handle(&self, peer_id: &str, frame: ClientFrame) {
        match frame {
            ClientFrame::Join {
                topic,
                config,
                reference,
            } => self.join(peer_id, topic, config, reference).await,
            ClientFrame::Leave { topic, .. } => self.leave(peer_id, &topic).await,
            ClientFrame::Broadcast {
                topic,
                event,
                payload,
                reference,
            } => self.broadcast(peer_id, topic, event, payload, reference).await,
            ClientFrame::Heartbeat { reference } => {
                self.reply(peer_id, ServerFrame::HeartbeatReply { reference })
                    .await;
            }
        }
    }

    pub async fn topic_members(&self, topic: &str) -> usize {
        let state = self.state.read().await;
        state.topics.get(topic).map_or(0, HashMap::len)
    }

    pub async fn peer_count(&self) -> usize {
        self.state.read().await.peers.len()
    }

    async fn join(&self, peer_id: &str, topic: String, config: ChannelConfig, reference: u64) {
        if topic.trim().is_empty() {
            warn!(%peer_id, "hub: join rejected, empty topic");
            self.reply(peer_id, ServerFrame::join_error(topic, reference, "topic must not be empty"))
                .await;
            return;
        }

        {
            let mut state = self.state.write().await;
            if !state.peers.contains_key(peer_id) {
                return;
            }
            state
                .topics
                .entry(topic.clone())
                .or_default()
                .insert(peer_id.to_string(), config);
        }

        metrics::relay_metrics().inc_joins();
        info!(%peer_id, %topic, "hub: peer joined topic");
        self.reply(peer_id, ServerFrame::join_ok(topic, reference)).await;
    }

    async fn leave(&self, peer_id: &str, topic: &str) {
        let mut state = self.state.write().await;
        if let Some(members) = state.topics.get_mut(topic) {
            members.remove(peer_id);
            if members.is_empty() {
                state.topics.remove(topic);
            }
        }
        debug!(%peer_id, %topic, "hub: peer left topic");
    }

    async fn broadcast(
        &self,
        peer_id: &str,
        topic: String,
        event: String,
        payload: serde_json::Value,
        reference: Option<u64>,
    ) {
        let state = self.state.read().await;

        let Some(members) = state.topics.get(&topic) else {
            drop(state);
            self.reply(peer_id, ServerFrame::error(Some(topic), "not joined to topic"))
                .await;
            return;
        };
        let Some(sender_config) = members.get(peer_id) else {
            drop(state);
            self.reply(peer_id, ServerFrame::error(Some(topic), "not joined to topic"))
                .await;
            return;
        };

        let frame = ServerFrame::Broadcast {
            topic: topic.clone(),
            event,
            payload,
        };

        let mut delivered = 0u64;
        for member in members.keys() {
            if member == peer_id && !sender_config.broadcast.self_echo {
                continue;
            }
            if let Some(tx) = state.peers.get(member) {
                if tx.send(frame.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }

        let metrics = metrics::relay_metrics();
        metrics.inc_broadcasts();
        metrics.inc_deliveries(delivered);
        debug!(%peer_id, %topic, delivered, "hub: broadcast relayed");

        if let (true, Some(reference)) = (sender_config.broadcast.ack, reference) {
            if let Some(tx) = state.peers.get(peer_id) {
                let _ = tx.send(ServerFrame::Ack { topic, reference });
            }
        }
    }

    async fn reply(&self, peer_id: &str, frame: ServerFrame) {
        let state = self.state.read().await;
        if let Some(tx) = state.peers.get(peer_id) {
            let _ = tx.send(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ReplyStatus;
    use serde_json::json;

    async fn joined(hub: &BroadcastHub, topic: &str, config: ChannelConfig) -> (String, PeerReceiver) {
        let (peer, mut rx) = hub.register().await;
        hub.handle(
            &peer,
            ClientFrame::Join {
                topic: topic.into(),
                config,
                reference: 1,
            },
        )
        .await;
        match rx.recv().await {
            Some(ServerFrame::JoinReply { status, .. }) => assert_eq!(status, ReplyStatus::Ok),
            other => panic!("expected join reply, got {other:?}"),
        }
        (peer, rx)
    }

    fn broadcast(topic: &str, reference: Option<u64>) -> ClientFrame {
        ClientFrame::Broadcast {
            topic: topic.into(),
            event: "player-control".into(),
            payload: json!({ "type": "PAUSE", "timestamp": 1 }),
            reference,
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_other_members_only() {
        let hub = BroadcastHub::new();
        let (admin, mut admin_rx) = joined(&hub, "video-control-1", ChannelConfig::default()).await;
        let (_follower, mut follower_rx) =
            joined(&hub, "video-control-1", ChannelConfig::default()).await;
        let (_other, mut other_rx) = joined(&hub, "video-control-2", ChannelConfig::default()).await;

        hub.handle(&admin, broadcast("video-control-1", None)).await;

        match follower_rx.recv().await {
            Some(ServerFrame::Broadcast { event, .. }) => assert_eq!(event, "player-control"),
            other => panic!("expected broadcast, got {other:?}"),
        }
        assert!(admin_rx.try_recv().is_err());
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn self_config_echoes_and_ack_confirms() {
        let hub = BroadcastHub::new();
        let (admin, mut admin_rx) =
            joined(&hub, "video-control-1", ChannelConfig::new(true, true)).await;

        hub.handle(&admin, broadcast("video-control-1", Some(9))).await;

        assert!(matches!(
            admin_rx.recv().await,
            Some(ServerFrame::Broadcast { .. })
        ));
        assert_eq!(
            admin_rx.recv().await,
            Some(ServerFrame::Ack {
                topic: "video-control-1".into(),
                reference: 9
            })
        );
    }

    #[tokio::test]
    async fn broadcast_without_join_is_rejected() {
        let hub = BroadcastHub::new();
        let (peer, mut rx) = hub.register().await;

        hub.handle(&peer, broadcast("video-control-1", None)).await;

        assert!(matches!(rx.recv().await, Some(ServerFrame::Error { .. })));
    }

    #[tokio::test]
    async fn empty_topic_join_fails() {
        let hub = BroadcastHub::new();
        let (peer, mut rx) = hub.register().await;
        hub.handle(
            &peer,
            ClientFrame::Join {
                topic: " ".into(),
                config: ChannelConfig::default(),
                reference: 4,
            },
        )
        .await;

        match rx.recv().await {
            Some(ServerFrame::JoinReply { status, reference, .. }) => {
                assert_eq!(status, ReplyStatus::Error);
                assert_eq!(reference, 4);
            }
            other => panic!("expected join reply, got {other:?}"),
        }
        assert_eq!(hub.topic_members(" ").await, 0);
    }

    #[tokio::test]
    async fn unregister_drops_memberships() {
        let hub = BroadcastHub::new();
        let (peer, _rx) = joined(&hub, "video-control-3", ChannelConfig::default()).await;
        assert_eq!(hub.topic_members("video-control-3").await, 1);

        hub.unregister(&peer).await;

        assert_eq!(hub.topic_members("video-control-3").await, 0);
        assert_eq!(hub.peer_count().await, 0);
    }
}
