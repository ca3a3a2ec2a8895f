use std::{env, time::Duration};

use common_net::{message::ChannelConfig, transport::ConnectionSettings};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:4000/ws";
const DEFAULT_JOIN_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("{var} must be a number, got {value:?}")]
    Number { var: &'static str, value: String },
    #[error("{var} must be true or false, got {value:?}")]
    Flag { var: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSettings {
    pub gateway_url: String,
    pub join_timeout_ms: u64,
    /// 0 disables heartbeats.
    pub heartbeat_interval_ms: u64,
    pub ack: bool,
    pub broadcast_self: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            join_timeout_ms: DEFAULT_JOIN_TIMEOUT_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            ack: true,
            broadcast_self: false,
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let defaults = Self::default();
        Ok(Self {
            gateway_url: lookup("SYNC_GATEWAY_URL").unwrap_or(defaults.gateway_url),
            join_timeout_ms: number(&lookup, "SYNC_JOIN_TIMEOUT_MS", defaults.join_timeout_ms)?,
            heartbeat_interval_ms: number(
                &lookup,
                "SYNC_HEARTBEAT_INTERVAL_MS",
                defaults.heartbeat_interval_ms,
            )?,
            ack: flag(&lookup, "SYNC_ACK", defaults.ack)?,
            broadcast_self: flag(&lookup, "SYNC_BROADCAST_SELF", defaults.broadcast_self)?,
        })
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            join_timeout: Duration::from_millis(self.join_timeout_ms),
            heartbeat_interval: (self.heartbeat_interval_ms > 0)
                .then(|| Duration::from_millis(self.heartbeat_interval_ms)),
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::new(self.ack, self.broadcast_self)
    }
}

fn number(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<u64, SettingsError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| SettingsError::Number { var, value }),
    }
}

fn flag(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool, SettingsError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(SettingsError::Flag { var, value }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_apply_without_env() {
        let settings = SyncSettings::from_lookup(lookup(&[])).expect("settings");
        assert_eq!(settings, SyncSettings::default());
        assert!(settings.channel_config().broadcast.ack);
    }

    #[test]
    fn env_overrides_and_zero_heartbeat_disables_it() {
        let settings = SyncSettings::from_lookup(lookup(&[
            ("SYNC_GATEWAY_URL", "ws://relay:9000/ws"),
            ("SYNC_JOIN_TIMEOUT_MS", "2500"),
            ("SYNC_HEARTBEAT_INTERVAL_MS", "0"),
            ("SYNC_ACK", "false"),
        ]))
        .expect("settings");

        assert_eq!(settings.gateway_url, "ws://relay:9000/ws");
        let connection = settings.connection_settings();
        assert_eq!(connection.join_timeout, Duration::from_millis(2500));
        assert_eq!(connection.heartbeat_interval, None);
        assert!(!settings.ack);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = SyncSettings::from_lookup(lookup(&[("SYNC_JOIN_TIMEOUT_MS", "soon")]))
            .expect_err("bad number");
        assert_eq!(
            err,
            SettingsError::Number {
                var: "SYNC_JOIN_TIMEOUT_MS",
                value: "soon".into()
            }
        );

        let err = SyncSettings::from_lookup(lookup(&[("SYNC_ACK", "maybe")])).expect_err("bad flag");
        assert!(matches!(err, SettingsError::Flag { var: "SYNC_ACK", .. }));
    }
}
