use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, level_filters::LevelFilter, trace};

use crate::util::parse_duration;

const ENV_PREFIX: &str = "SENTINEL_";

const DEFAULT_CONFIG_FILE: &str = "server-config.json";

const DEFAULT_ENV_FILE: &str = ".server.env";

/// Errors raised while loading or validating the server configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid probe inactivity delay '{0}' (expected e.g. \"30s\" or \"1m30s\")")]
    InvalidDuration(String),

    #[error("threshold '{0}' must be at least 1")]
    InvalidThreshold(&'static str),

    #[error("invalid logging level '{0}'")]
    InvalidLogLevel(String),

    #[error("invalid value '{value}' for environment variable {key}")]
    InvalidEnv { key: String, value: String },
}

/// Alert provider bound to one severity tier
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alert {
    Discord(Discord),
    Webhook(Webhook),
    Pagerduty(PagerDuty),
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct PagerDuty {
    pub integration_key: String,
    #[serde(default = "default_pagerduty_url")]
    pub url: String,
}

fn default_pagerduty_url() -> String {
    String::from("https://events.pagerduty.com/v2/enqueue")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default = "default_address")]
    pub address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    pub auth_token: Option<String>,

    /// How long a probe may stay silent before one inactivity tick is counted
    #[serde(default = "default_inactivity_delay")]
    pub probe_inactivity_delay: String,
    #[serde(default = "default_degraded_to_failed")]
    pub degraded_to_failed: usize,
    #[serde(default = "default_failed_to_alerted_low")]
    pub failed_to_alerted_low: usize,
    #[serde(default = "default_alerted_low_to_alerted_high")]
    pub alerted_low_to_alerted_high: usize,

    #[serde(default = "default_logging_level")]
    pub logging_level: String,

    /// Publish probe snapshots to dashboard subscribers
    #[serde(default = "default_dashboard")]
    pub dashboard: bool,
    #[serde(default = "default_dashboard_interval")]
    pub dashboard_interval_secs: u64,

    pub low_alert_provider: Option<Alert>,
    pub high_alert_provider: Option<Alert>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            auth_token: None,
            probe_inactivity_delay: default_inactivity_delay(),
            degraded_to_failed: default_degraded_to_failed(),
            failed_to_alerted_low: default_failed_to_alerted_low(),
            alerted_low_to_alerted_high: default_alerted_low_to_alerted_high(),
            logging_level: default_logging_level(),
            dashboard: default_dashboard(),
            dashboard_interval_secs: default_dashboard_interval(),
            low_alert_provider: None,
            high_alert_provider: None,
        }
    }
}

fn default_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    5000
}

fn default_inactivity_delay() -> String {
    String::from("30s")
}

fn default_degraded_to_failed() -> usize {
    2
}

fn default_failed_to_alerted_low() -> usize {
    3
}

fn default_alerted_low_to_alerted_high() -> usize {
    5
}

fn default_logging_level() -> String {
    String::from("info")
}

fn default_dashboard() -> bool {
    true
}

fn default_dashboard_interval() -> u64 {
    5
}

/// Escalation thresholds, all counted in inactivity ticks (or consecutive reports for services)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub degraded_to_failed: usize,
    pub failed_to_alerted_low: usize,
    pub alerted_low_to_alerted_high: usize,
}

impl Thresholds {
    /// Consecutive failures after which a service reaches the high alert
    pub fn high_boundary(&self) -> usize {
        self.failed_to_alerted_low + self.alerted_low_to_alerted_high
    }
}

/// Validated settings consumed by the monitoring actors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringSettings {
    pub inactivity_delay: Duration,
    pub thresholds: Thresholds,

    /// `None` when the dashboard is disabled
    pub dashboard_interval: Option<Duration>,
}

impl Config {
    /// Resolve the raw configuration into settings the monitoring engine can run with
    pub fn monitoring_settings(&self) -> Result<MonitoringSettings, ConfigError> {
        let inactivity_delay = parse_duration(&self.probe_inactivity_delay)
            .filter(|delay| !delay.is_zero())
            .ok_or_else(|| ConfigError::InvalidDuration(self.probe_inactivity_delay.clone()))?;

        if self.degraded_to_failed == 0 {
            return Err(ConfigError::InvalidThreshold("degraded_to_failed"));
        }
        if self.failed_to_alerted_low == 0 {
            return Err(ConfigError::InvalidThreshold("failed_to_alerted_low"));
        }
        if self.alerted_low_to_alerted_high == 0 {
            return Err(ConfigError::InvalidThreshold("alerted_low_to_alerted_high"));
        }

        let dashboard_interval = self
            .dashboard
            .then(|| Duration::from_secs(self.dashboard_interval_secs.max(1)));

        Ok(MonitoringSettings {
            inactivity_delay,
            thresholds: Thresholds {
                degraded_to_failed: self.degraded_to_failed,
                failed_to_alerted_low: self.failed_to_alerted_low,
                alerted_low_to_alerted_high: self.alerted_low_to_alerted_high,
            },
            dashboard_interval,
        })
    }

    pub fn log_level(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.logging_level)
            .map_err(|_| ConfigError::InvalidLogLevel(self.logging_level.clone()))
    }

    /// Override values from `SENTINEL_*` environment variables
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Override values using an arbitrary variable lookup (keys carry the `SENTINEL_` prefix)
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, value)) = get("ADDRESS") {
            self.address = parse_env(key, value)?;
        }
        if let Some((key, value)) = get("PORT") {
            self.port = parse_env(key, value)?;
        }
        if let Some((_, value)) = get("AUTH_TOKEN") {
            self.auth_token = Some(value);
        }
        if let Some((_, value)) = get("PROBE_INACTIVITY_DELAY") {
            self.probe_inactivity_delay = value;
        }
        if let Some((key, value)) = get("DEGRADED_TO_FAILED") {
            self.degraded_to_failed = parse_env(key, value)?;
        }
        if let Some((key, value)) = get("FAILED_TO_ALERTED_LOW") {
            self.failed_to_alerted_low = parse_env(key, value)?;
        }
        if let Some((key, value)) = get("ALERTED_LOW_TO_ALERTED_HIGH") {
            self.alerted_low_to_alerted_high = parse_env(key, value)?;
        }
        if let Some((_, value)) = get("LOGGING_LEVEL") {
            self.logging_level = value;
        }
        if let Some((key, value)) = get("DASHBOARD") {
            self.dashboard = parse_env(key, value)?;
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(key: String, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}

pub fn read_config_file(path: &str) -> Result<Config, ConfigError> {
    let file_content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    serde_json::from_str(&file_content)
        .map_err(ConfigError::from)
        .inspect(|config| trace!("loaded config: {config:?}"))
}

/// Load the configuration: explicit file, else `./server-config.json` if present, else defaults.
/// Environment overrides (optionally from `.server.env`) are applied last.
pub fn load(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => read_config_file(DEFAULT_CONFIG_FILE)?,
        None => {
            debug!("no configuration file found, running with defaults");
            Config::default()
        }
    };

    if dotenv::from_filename(DEFAULT_ENV_FILE).is_ok() {
        debug!("loaded environment from {DEFAULT_ENV_FILE}");
    }
    config.apply_env()?;

    Ok(config)
}
