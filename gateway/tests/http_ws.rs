use std::{net::SocketAddr, time::Duration};

use common_net::{
    message::{self, ChannelConfig, ServerFrame},
    shutdown, telemetry,
    transport::{ChannelStatus, ConnectionSettings, Connector, WsConnector},
};
use futures_util::{SinkExt, StreamExt};
use gateway::{GatewayConfig, HEALTHZ_PATH, METRICS_PATH, VERSION_PATH, WS_PATH};
use reqwest::StatusCode;
use serde_json::json;
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, tungstenite::Message};

type BoxError = gateway::BoxError;

async fn spawn_gateway() -> Result<
    (
        SocketAddr,
        shutdown::ShutdownSender,
        tokio::task::JoinHandle<Result<(), BoxError>>,
    ),
    BoxError,
> {
    telemetry::init("gateway-test");

    let (ready_tx, ready_rx) = oneshot::channel();
    let config = GatewayConfig {
        bind_addr: "127.0.0.1:0".parse()?,
        ready_tx: Some(ready_tx),
    };

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let handle = tokio::spawn(gateway::run(config, shutdown_rx));
    let addr = ready_rx.await?;

    Ok((addr, shutdown_tx, handle))
}

fn quick_settings() -> ConnectionSettings {
    ConnectionSettings {
        join_timeout: Duration::from_secs(2),
        heartbeat_interval: None,
    }
}

#[tokio::test]
async fn http_endpoints_work() -> Result<(), BoxError> {
    let (addr, shutdown_tx, handle) = spawn_gateway().await?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;
    let base = format!("http://{addr}");

    let health = client.get(format!("{base}{HEALTHZ_PATH}")).send().await?;
    assert_eq!(StatusCode::OK, health.status());

    let version_resp = client.get(format!("{base}{VERSION_PATH}")).send().await?;
    assert_eq!(StatusCode::OK, version_resp.status());
    let version_body: serde_json::Value = version_resp.json().await?;
    assert_eq!("gateway", version_body["name"]);

    let metrics_resp = client.get(format!("{base}{METRICS_PATH}")).send().await?;
    assert_eq!(StatusCode::OK, metrics_resp.status());
    let metrics_text = metrics_resp.text().await?;
    assert!(metrics_text.contains("gateway_http_requests_total"));
    assert!(metrics_text.contains("relay_joins_total"));

    shutdown::trigger(&shutdown_tx);
    handle.await??;
    Ok(())
}

#[tokio::test]
async fn websocket_relays_broadcasts_between_peers() -> Result<(), BoxError> {
    let (addr, shutdown_tx, handle) = spawn_gateway().await?;
    let connector = WsConnector::new(format!("ws://{addr}{WS_PATH}"));

    let admin = connector.connect(quick_settings()).await?;
    let follower = connector.connect(quick_settings()).await?;

    let mut admin_channel = admin.channel("video-control-42", ChannelConfig::new(true, false));
    let mut follower_channel = follower.channel("video-control-42", ChannelConfig::default());
    admin_channel.subscribe()?;
    follower_channel.subscribe()?;
    assert_eq!(admin_channel.wait_until_settled().await, ChannelStatus::Joined);
    assert_eq!(follower_channel.wait_until_settled().await, ChannelStatus::Joined);

    admin_channel.send_broadcast(
        "player-control",
        json!({ "type": "SEEK", "currentTime": 33.0, "timestamp": 1000 }),
    )?;

    let message = tokio::time::timeout(Duration::from_secs(2), follower_channel.recv())
        .await?
        .ok_or("follower channel closed")?;
    assert_eq!(message.event, "player-control");
    assert_eq!(message.payload["currentTime"], 33.0);

    shutdown::trigger(&shutdown_tx);
    handle.await??;
    Ok(())
}

#[tokio::test]
async fn malformed_frame_gets_error_reply() -> Result<(), BoxError> {
    let (addr, shutdown_tx, handle) = spawn_gateway().await?;
    let (mut ws, _) = connect_async(format!("ws://{addr}{WS_PATH}")).await?;

    ws.send(Message::Text(r#"{"event":"player-control"}"#.to_string()))
        .await?;

    let reply = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await?
        .ok_or("socket closed")??;
    let frame = match reply {
        Message::Text(text) => message::decode_server(text.as_bytes())?,
        other => return Err(format!("unexpected message {other:?}").into()),
    };
    assert!(matches!(frame, ServerFrame::Error { topic: None, .. }));

    shutdown::trigger(&shutdown_tx);
    handle.await??;
    Ok(())
}
