use std::net::SocketAddr;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use common_net::{
    metrics, shutdown,
    transport::{Connector, WsConnector},
    telemetry,
};
use player_sync::{
    session::MatchContext, BoxError, ControlCommand, PublishOutcome, Role, SimulatedPlayer,
    SyncSession, SyncSettings,
};

const METRICS_PATH: &str = "/metrics";

#[derive(Debug, Parser)]
#[command(author, version, about = "Mirror a match video player through the broadcast relay")]
struct SyncCli {
    #[arg(long, value_name = "ID")]
    match_id: String,

    #[arg(long, default_value = "follower")]
    role: Role,

    #[arg(long, value_name = "URL")]
    gateway_url: Option<String>,

    /// Video already loaded in the local player.
    #[arg(long, value_name = "ID")]
    video_id: Option<String>,

    #[arg(long, value_name = "MS")]
    join_timeout_ms: Option<u64>,

    #[arg(long, value_name = "ADDR")]
    metrics_addr: Option<SocketAddr>,
}

impl SyncCli {
    fn apply_overrides(&self, settings: &mut SyncSettings) {
        if let Some(url) = &self.gateway_url {
            settings.gateway_url = url.clone();
        }
        if let Some(timeout) = self.join_timeout_ms {
            settings.join_timeout_ms = timeout;
        }
    }

    fn context(&self) -> MatchContext {
        let context = MatchContext::new(self.match_id.clone(), self.role);
        match &self.video_id {
            Some(video_id) => context.with_video(video_id.clone()),
            None => context,
        }
    }
}

async fn run(cli: SyncCli) -> Result<(), BoxError> {
    let mut settings = SyncSettings::from_env()?;
    cli.apply_overrides(&mut settings);

    if let Some(addr) = cli.metrics_addr {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, path = METRICS_PATH, "player-sync metrics exporter listening");
        tokio::spawn(async move {
            if let Err(err) = metrics::serve_metrics(listener, METRICS_PATH).await {
                error!(%err, "player-sync metrics exporter stopped");
            }
        });
    }

    let connector = WsConnector::new(settings.gateway_url.clone());
    info!(url = connector.url(), "connecting to relay gateway");
    let connection = connector.connect(settings.connection_settings()).await?;

    let context = cli.context();
    let player = match &context.loaded_video {
        Some(video_id) => SimulatedPlayer::with_video(video_id.clone()),
        None => SimulatedPlayer::new(),
    }
    .verbose();
    let session = SyncSession::mount(&connection, &settings, context, player).await;

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let ctrl_c = shutdown::spawn_ctrl_c(shutdown_tx, "player-sync");

    match session.role() {
        Role::Follower => {
            session.run(shutdown_rx).await;
        }
        Role::Admin => run_admin_console(session, shutdown_rx).await,
    }

    ctrl_c.abort();
    Ok(())
}

/// Reads console commands, plays them locally and broadcasts them.
async fn run_admin_console(
    mut session: SyncSession<SimulatedPlayer>,
    shutdown_rx: shutdown::ShutdownReceiver,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown::wait(shutdown_rx);
    tokio::pin!(shutdown);

    info!("admin console ready: play [seconds] | pause | seek <seconds> | load <video id>");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            // drain echoes so they do not pile up
            inbound = session.next_inbound() => {
                if inbound.is_none() {
                    warn!("admin channel closed");
                    break;
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        error!(%err, "cannot read console");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ControlCommand>() {
                    Ok(command) => match session.perform(command) {
                        PublishOutcome::Sent(event) => {
                            info!(kind = event.command().kind(), timestamp = event.timestamp(), "broadcast sent");
                        }
                        PublishOutcome::Skipped(reason) => {
                            warn!(reason = reason.as_str(), "broadcast skipped");
                        }
                    },
                    Err(err) => warn!(%err, "unrecognized command"),
                }
            }
        }
    }

    session.unmount();
}

#[tokio::main]
async fn main() {
    telemetry::init("player-sync");

    let cli = SyncCli::parse();

    if let Err(err) = run(cli).await {
        error!(%err, "player-sync exited with error");
    }
}
