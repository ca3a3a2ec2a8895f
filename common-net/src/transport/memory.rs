use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Connection, ConnectionSettings, Connector, TransportError, TransportKind};
use crate::hub::BroadcastHub;

/// Connects straight into an in-process [`BroadcastHub`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    hub: Arc<BroadcastHub>,
}

impl MemoryConnector {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn kind(&self) -> TransportKind {
        TransportKind::Memory
    }

    async fn connect(&self, settings: ConnectionSettings) -> Result<Connection, TransportError> {
        let (peer_id, inbound) = self.hub.register().await;
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

        let hub = self.hub.clone();
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                hub.handle(&peer_id, frame).await;
            }
            hub.unregister(&peer_id).await;
            debug!(%peer_id, "memory transport: peer detached");
        });

        Ok(Connection::from_pipes(
            TransportKind::Memory,
            outbound_tx,
            inbound,
            settings,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ChannelConfig;
    use crate::transport::ChannelStatus;
    use serde_json::json;

    #[tokio::test]
    async fn two_connections_exchange_broadcasts_through_the_hub() {
        let connector = MemoryConnector::new(Arc::new(BroadcastHub::new()));
        let admin = connector
            .connect(ConnectionSettings::default())
            .await
            .expect("connect admin");
        let follower = connector
            .connect(ConnectionSettings::default())
            .await
            .expect("connect follower");

        let mut admin_channel = admin.channel("video-control-9", ChannelConfig::new(true, false));
        let mut follower_channel = follower.channel("video-control-9", ChannelConfig::default());
        admin_channel.subscribe().expect("subscribe admin");
        follower_channel.subscribe().expect("subscribe follower");
        assert_eq!(admin_channel.wait_until_settled().await, ChannelStatus::Joined);
        assert_eq!(follower_channel.wait_until_settled().await, ChannelStatus::Joined);
        assert_eq!(connector.hub().topic_members("video-control-9").await, 2);

        admin_channel
            .send_broadcast("player-control", json!({ "type": "PAUSE", "timestamp": 5 }))
            .expect("send");

        let message = follower_channel.recv().await.expect("message");
        assert_eq!(message.payload["type"], "PAUSE");
    }

    #[tokio::test]
    async fn dropping_everything_detaches_the_peer() {
        let connector = MemoryConnector::new(Arc::new(BroadcastHub::new()));
        let connection = connector
            .connect(ConnectionSettings::default())
            .await
            .expect("connect");
        assert_eq!(connector.hub().peer_count().await, 1);

        drop(connection);

        for _ in 0..50 {
            if connector.hub().peer_count().await == 0 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("peer was never detached");
    }
}
