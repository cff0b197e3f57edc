//! Configuration for the pairing broker.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Broker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Session provider bridge configuration
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Session lifecycle and storage configuration
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Delivery message branding
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Bridge REST API URL
    #[serde(default = "default_bridge_api_url")]
    pub api_url: String,

    /// How often to poll the bridge for connection events
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Browser identity the provider presents when linking
    #[serde(default = "default_browser")]
    pub browser: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Directory holding one working directory per session
    #[serde(default = "default_sessions_root")]
    pub root: PathBuf,

    /// Reconnect attempts allowed after retryable disconnects
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// How long a session may wait for authentication before it is abandoned
    #[serde(default = "default_pairing_timeout", with = "humantime_serde")]
    pub pairing_timeout: Duration,

    /// Interval between background sweeps of the sessions root
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Working directories older than this are removed by the sweeper
    #[serde(default = "default_max_age", with = "humantime_serde")]
    pub max_age: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Global requests per minute
    #[serde(default = "default_global_rpm")]
    pub global_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Prefix of the machine-parsable credential message
    #[serde(default = "default_marker_prefix")]
    pub marker_prefix: String,

    /// Bot name shown in the instructions banner
    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    /// Owner contact shown under support links
    #[serde(default)]
    pub owner_contact: Option<String>,

    /// Source repository URL
    #[serde(default)]
    pub repository_url: Option<String>,

    /// Announcement channel URL
    #[serde(default)]
    pub channel_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default implementations
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_url: default_bridge_api_url(),
            poll_interval: default_poll_interval(),
            browser: default_browser(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            root: default_sessions_root(),
            max_retries: default_max_retries(),
            pairing_timeout: default_pairing_timeout(),
            sweep_interval: default_sweep_interval(),
            max_age: default_max_age(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_per_minute: default_global_rpm(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            marker_prefix: default_marker_prefix(),
            bot_name: default_bot_name(),
            owner_contact: None,
            repository_url: None,
            channel_url: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    3000
}

fn default_bridge_api_url() -> String {
    "http://pairing-bridge:8080".into()
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_browser() -> String {
    "macOS/Chrome".into()
}

fn default_sessions_root() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_max_retries() -> u32 {
    5
}

fn default_pairing_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_max_age() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_global_rpm() -> u32 {
    30
}

fn default_marker_prefix() -> String {
    "SESSION~".into()
}

fn default_bot_name() -> String {
    "Pairing Bot".into()
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
