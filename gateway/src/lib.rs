// Relay gateway: hosts per-match broadcast topics over WebSocket.
// Binary entrypoint is src/main.rs.

use std::{fs, net::SocketAddr, path::Path, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};
use thiserror::Error;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use common_net::{
    hub::BroadcastHub,
    message::{self, ServerFrame},
    metrics, shutdown,
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub const HEALTHZ_PATH: &str = "/healthz";
pub const VERSION_PATH: &str = "/version";
pub const METRICS_PATH: &str = "/metrics";
pub const WS_PATH: &str = "/ws";

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:4000";

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gateway_http_requests_total",
        "Total HTTP requests by route",
        &["path"]
    )
    .expect("register gateway_http_requests_total")
});

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid bind address {value:?}: {source}")]
    BindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct GatewaySettings {
    pub bind_addr: SocketAddr,
}

impl GatewaySettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        let value = std::env::var("GATEWAY_BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = value
            .parse()
            .map_err(|source| SettingsError::BindAddr { value, source })?;
        Ok(Self { bind_addr })
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub ready_tx: Option<oneshot::Sender<SocketAddr>>,
}

impl GatewayConfig {
    pub fn from_settings(settings: GatewaySettings) -> Self {
        Self {
            bind_addr: settings.bind_addr,
            ready_tx: None,
        }
    }

    pub fn from_env() -> Result<Self, SettingsError> {
        GatewaySettings::from_env().map(Self::from_settings)
    }
}

pub fn build_router(hub: Arc<BroadcastHub>) -> Router {
    Router::new()
        .route(HEALTHZ_PATH, get(healthz))
        .route(VERSION_PATH, get(version))
        .route(METRICS_PATH, get(metrics_endpoint))
        .route(WS_PATH, get(ws_handler))
        .with_state(hub)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> impl IntoResponse {
    HTTP_REQUESTS_TOTAL.with_label_values(&[HEALTHZ_PATH]).inc();
    axum::http::StatusCode::OK
}

async fn version() -> impl IntoResponse {
    HTTP_REQUESTS_TOTAL.with_label_values(&[VERSION_PATH]).inc();
    Json(serde_json::json!({
        "name": "gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics_endpoint() -> Response {
    HTTP_REQUESTS_TOTAL.with_label_values(&[METRICS_PATH]).inc();
    metrics::metrics_handler().await
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<BroadcastHub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_session(socket, hub))
}

async fn ws_session(mut socket: WebSocket, hub: Arc<BroadcastHub>) {
    let (peer_id, mut outbound) = hub.register().await;
    debug!(%peer_id, "gateway: websocket session opened");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let bytes = match msg {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = socket.send(Message::Pong(payload)).await;
                        continue;
                    }
                    Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                };

                match message::decode_client(&bytes) {
                    Ok(frame) => hub.handle(&peer_id, frame).await,
                    Err(err) => {
                        warn!(%peer_id, %err, "gateway: malformed client frame");
                        let reply = ServerFrame::error(None, format!("malformed frame: {err}"));
                        if !send_frame(&mut socket, &reply).await {
                            break;
                        }
                    }
                }
            }

            Some(frame) = outbound.recv() => {
                if !send_frame(&mut socket, &frame).await {
                    break;
                }
            }
        }
    }

    hub.unregister(&peer_id).await;
    debug!(%peer_id, "gateway: websocket session closed");
    let _ = socket.close().await;
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> bool {
    match message::encode_server(frame) {
        Ok(text) => socket.send(Message::Text(text)).await.is_ok(),
        Err(err) => {
            error!(%err, "gateway: encode server frame failed");
            true
        }
    }
}

pub async fn run_with_ctrl_c(config: GatewayConfig) -> Result<(), BoxError> {
    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let ctrl_c = shutdown::spawn_ctrl_c(shutdown_tx, "gateway");

    let result = run(config, shutdown_rx).await;

    ctrl_c.abort();
    result
}

pub async fn run(
    config: GatewayConfig,
    shutdown_rx: shutdown::ShutdownReceiver,
) -> Result<(), BoxError> {
    metrics::relay_metrics().on_startup();

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .map_err(|err| Box::new(err) as BoxError)?;
    let local_addr = listener
        .local_addr()
        .map_err(|err| Box::new(err) as BoxError)?;
    if let Some(tx) = config.ready_tx {
        let _ = tx.send(local_addr);
    }

    info!(%local_addr, path = WS_PATH, "gateway listening");

    let app = build_router(Arc::new(BroadcastHub::new()));
    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(%err, "gateway server stopped unexpectedly");
        }
    });

    shutdown::wait(shutdown_rx).await;
    info!("gateway shutting down");
    server.abort();
    Ok(())
}
