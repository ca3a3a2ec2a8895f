use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

use common_net::telemetry;
use gateway::{GatewayConfig, GatewaySettings, SettingsError};

#[derive(Debug, Parser)]
#[command(author, version, about = "Broadcast relay for shared video player control")]
struct GatewayCli {
    #[arg(long = "config", value_name = "PATH", env = "GATEWAY_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,
}

impl GatewayCli {
    fn apply_overrides(&self, settings: &mut GatewaySettings) {
        if let Some(addr) = self.bind {
            settings.bind_addr = addr;
        }
    }
}

fn build_config(cli: &GatewayCli) -> Result<GatewayConfig, SettingsError> {
    let mut settings = match &cli.config_path {
        Some(path) => GatewaySettings::from_file(path)?,
        None => GatewaySettings::from_env()?,
    };

    cli.apply_overrides(&mut settings);

    Ok(GatewayConfig::from_settings(settings))
}

#[tokio::main]
async fn main() {
    telemetry::init("gateway");

    let cli = GatewayCli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "gateway: invalid configuration");
            return;
        }
    };

    if let Err(err) = gateway::run_with_ctrl_c(config).await {
        tracing::error!(%err, "gateway exited with error");
    }
}
