//! Connector settings
//!
//! Settings load from an optional `connector.toml` file layered with
//! `CONNECTOR__*` environment variables (e.g. `CONNECTOR__WS__URL`). Every
//! field has a default so `Settings::default()` talks to the production
//! endpoints out of the box.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Top-level connector settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub rest: RestSettings,
    #[serde(default)]
    pub ws: WsSettings,
}

impl Settings {
    /// Load settings from `connector.toml` (optional) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("connector").required(false))
            .add_source(Environment::with_prefix("CONNECTOR").separator("__"))
            .build()?
            .try_deserialize()
    }
}

/// REST adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestSettings {
    /// Base URL of the public REST API.
    #[serde(default = "default_rest_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Total attempts per operation on transport failures.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Fixed delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl RestSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            base_url: default_rest_base_url(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// WebSocket session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsSettings {
    /// Streaming endpoint URL.
    #[serde(default = "default_ws_url")]
    pub url: String,
    /// Flags sent in the one-time post-connect `conf` exchange.
    #[serde(default = "default_conf_flags")]
    pub conf_flags: u32,
    /// Reconnect attempts before the session turns fatal.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Backoff unit in milliseconds; the wait before attempt N is
    /// `backoff_base * 2^N`.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl WsSettings {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            url: default_ws_url(),
            conf_flags: default_conf_flags(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_rest_base_url() -> String {
    "https://api-pub.bitfinex.com/v2".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_ws_url() -> String {
    "wss://api-pub.bitfinex.com/ws/2".to_string()
}

fn default_conf_flags() -> u32 {
    32768
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_production_endpoints() {
        let settings = Settings::default();
        assert_eq!(settings.rest.base_url, "https://api-pub.bitfinex.com/v2");
        assert_eq!(settings.ws.url, "wss://api-pub.bitfinex.com/ws/2");
        assert_eq!(settings.rest.retry_attempts, 3);
        assert_eq!(settings.rest.retry_delay(), Duration::from_secs(2));
        assert_eq!(settings.ws.max_reconnect_attempts, 5);
        assert_eq!(settings.ws.backoff_base(), Duration::from_secs(1));
        assert_eq!(settings.ws.conf_flags, 32768);
    }
}
