use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub stomp: StompConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub otel: OtelConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directives; falls back to `RUST_LOG`, then `info`
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StompConfig {
    /// WebSocket endpoint of the notification broker
    #[serde(default = "default_url")]
    pub url: String,
    /// Virtual host sent in the CONNECT frame (defaults to the URL host)
    #[serde(default)]
    pub host: Option<String>,
    /// Delay before a reconnect attempt in milliseconds (0 disables reconnection)
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Upper bound for the reconnect delay when a multiplier is configured
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay_ms: u64,
    /// Growth factor applied to the delay after each failed attempt
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    #[serde(default)]
    pub reconnect_jitter: f64,
    /// Interval at which we expect server heartbeats (0 disables)
    #[serde(default = "default_heartbeat")]
    pub heartbeat_incoming_ms: u64,
    /// Interval at which we send heartbeats (0 disables)
    #[serde(default = "default_heartbeat")]
    pub heartbeat_outgoing_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

/// Identity used by the standalone listener binary
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListenerConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub token: String,
}

fn default_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_reconnect_delay() -> u64 {
    5000
}

fn default_reconnect_max_delay() -> u64 {
    60_000
}

fn default_reconnect_multiplier() -> f64 {
    1.0
}

fn default_heartbeat() -> u64 {
    4000
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "uni-earn-notifications".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("stomp.url", default_url())?
            .set_default("stomp.reconnect_delay_ms", default_reconnect_delay())?
            .set_default("stomp.heartbeat_incoming_ms", default_heartbeat())?
            .set_default("stomp.heartbeat_outgoing_ms", default_heartbeat())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // STOMP__URL, LISTENER__TOKEN, OTEL__ENABLED, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

impl StompConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_incoming(&self) -> Duration {
        Duration::from_millis(self.heartbeat_incoming_ms)
    }

    pub fn heartbeat_outgoing(&self) -> Duration {
        Duration::from_millis(self.heartbeat_outgoing_ms)
    }
}

impl Default for StompConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            host: None,
            reconnect_delay_ms: default_reconnect_delay(),
            reconnect_max_delay_ms: default_reconnect_max_delay(),
            reconnect_multiplier: default_reconnect_multiplier(),
            reconnect_jitter: 0.0,
            heartbeat_incoming_ms: default_heartbeat(),
            heartbeat_outgoing_ms: default_heartbeat(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
