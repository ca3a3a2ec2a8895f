use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use once_cell::sync::OnceCell;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Metric set for the broadcast relay.
pub struct RelayMetrics {
    pub connections_active: IntGauge,
    pub joins_total: IntCounter,
    pub broadcasts_total: IntCounter,
    pub deliveries_total: IntCounter,
}

impl RelayMetrics {
    pub fn on_startup(&self) {
        self.joins_total.inc_by(0);
        self.broadcasts_total.inc_by(0);
        self.deliveries_total.inc_by(0);
    }

    pub fn set_connections(&self, connections: i64) {
        self.connections_active.set(connections);
    }

    pub fn inc_joins(&self) {
        self.joins_total.inc();
    }

    pub fn inc_broadcasts(&self) {
        self.broadcasts_total.inc();
    }

    pub fn inc_deliveries(&self, delivered: u64) {
        self.deliveries_total.inc_by(delivered);
    }
}

/// Metric set for player control publishing and applying.
pub struct SyncMetrics {
    pub events_published_total: IntCounter,
    pub events_applied_total: IntCounter,
    pub events_discarded_total: IntCounterVec,
}

impl SyncMetrics {
    pub fn inc_published(&self) {
        self.events_published_total.inc();
    }

    pub fn inc_applied(&self) {
        self.events_applied_total.inc();
    }

    pub fn inc_discarded(&self, reason: &str) {
        self.events_discarded_total.with_label_values(&[reason]).inc();
    }
}

static RELAY_METRICS: OnceCell<RelayMetrics> = OnceCell::new();
static SYNC_METRICS: OnceCell<SyncMetrics> = OnceCell::new();

pub fn relay_metrics() -> &'static RelayMetrics {
    RELAY_METRICS.get_or_init(|| RelayMetrics {
        connections_active: register_int_gauge!(
            "relay_connections_active",
            "Number of peers currently connected to the relay"
        )
        .expect("register relay_connections_active"),
        joins_total: register_int_counter!(
            "relay_joins_total",
            "Total number of successful topic joins"
        )
        .expect("register relay_joins_total"),
        broadcasts_total: register_int_counter!(
            "relay_broadcasts_total",
            "Total number of broadcasts accepted by the relay"
        )
        .expect("register relay_broadcasts_total"),
        deliveries_total: register_int_counter!(
            "relay_deliveries_total",
            "Total number of broadcast copies handed to subscribers"
        )
        .expect("register relay_deliveries_total"),
    })
}

pub fn sync_metrics() -> &'static SyncMetrics {
    SYNC_METRICS.get_or_init(|| SyncMetrics {
        events_published_total: register_int_counter!(
            "sync_events_published_total",
            "Player control events published by admins"
        )
        .expect("register sync_events_published_total"),
        events_applied_total: register_int_counter!(
            "sync_events_applied_total",
            "Player control events applied by followers"
        )
        .expect("register sync_events_applied_total"),
        events_discarded_total: register_int_counter_vec!(
            "sync_events_discarded_total",
            "Player control events dropped before reaching the player",
            &["reason"]
        )
        .expect("register sync_events_discarded_total"),
    })
}

pub fn metrics_router(metrics_path: &'static str) -> Router {
    Router::new().route(metrics_path, get(metrics_handler))
}

pub async fn serve_metrics(
    listener: TcpListener,
    metrics_path: &'static str,
) -> Result<(), BoxError> {
    let router = metrics_router(metrics_path);
    axum::serve(listener, router)
        .await
        .map_err(|err| Box::new(err) as BoxError)
}

/// Renders the default registry in the prometheus text format.
pub fn render() -> Result<(String, String), BoxError> {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|err| Box::new(err) as BoxError)?;
    let body = String::from_utf8(buffer).map_err(|err| Box::new(err) as BoxError)?;
    Ok((encoder.format_type().to_string(), body))
}

pub async fn metrics_handler() -> Response {
    let (content_type, body) = match render() {
        Ok(rendered) => rendered,
        Err(err) => {
            error!(%err, "metrics: encode failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
