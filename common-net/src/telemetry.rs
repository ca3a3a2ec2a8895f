use std::sync::Once;

use tracing::info;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

const DEFAULT_DIRECTIVE: &str = "info";

/// Installs the global fmt subscriber once per process. `RUST_LOG` wins over
/// the default `info` filter.
pub fn init(service_name: &str) {
    init_with_default(service_name, DEFAULT_DIRECTIVE);
}

pub fn init_with_default(service_name: &str, default_directive: &str) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_names(true)
            .compact()
            .init();
    });

    info!(service = service_name, "telemetry initialized");
}
