//! Process settings: optional `relaycast.toml`, then `RELAYCAST_*` variables.

use std::{path::PathBuf, sync::Arc, time::Duration};

use config::{Config, ConfigError, Environment, File};
use relaycast_session::{
    BackoffPolicy, DnsProbe, NetworkMonitor, SupervisorConfig,
    heartbeat::DEFAULT_HEARTBEAT_INTERVAL,
    network::{DEFAULT_POLL_INTERVAL, DEFAULT_PROBE_HOST},
    storage::file::DEFAULT_PROGRESS_FILE,
};
use relaycast_transport::{
    GatewayConfig,
    gateway::{DEFAULT_AUTH_DIR, DEFAULT_CONNECT_TIMEOUT, DEFAULT_GATEWAY_ADDRESS, DEFAULT_REQUEST_TIMEOUT},
};
use serde::Deserialize;

/// Settings file read from the working directory, if present.
pub const SETTINGS_FILE: &str = "relaycast.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gateway: GatewaySettings,
    pub auth_dir: PathBuf,
    pub progress_file: PathBuf,
    pub heartbeat_interval_secs: u64,
    pub network: NetworkSettings,
    pub backoff: BackoffSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub address: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub probe_host: String,
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway: GatewaySettings::default(),
            auth_dir: PathBuf::from(DEFAULT_AUTH_DIR),
            progress_file: PathBuf::from(DEFAULT_PROGRESS_FILE),
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL.as_secs(),
            network: NetworkSettings::default(),
            backoff: BackoffSettings::default(),
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            address: DEFAULT_GATEWAY_ADDRESS.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            probe_host: DEFAULT_PROBE_HOST.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
        }
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            initial_ms: duration_ms(policy.initial_delay),
            max_ms: duration_ms(policy.max_delay),
            multiplier: policy.multiplier,
            jitter: policy.jitter,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Settings {
    /// Load from [`SETTINGS_FILE`] and the environment.
    ///
    /// # Errors
    /// Returns error if the file or a variable cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(SETTINGS_FILE)
    }

    /// Load from `path` (optional) and the environment.
    ///
    /// # Errors
    /// Returns error if the file or a variable cannot be parsed, or if a
    /// value is out of range.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let settings: Self = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("RELAYCAST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the runtime cannot work with.
    ///
    /// # Errors
    /// Returns [`ConfigError::Message`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("gateway.connect_timeout_secs", self.gateway.connect_timeout_secs),
            ("gateway.request_timeout_secs", self.gateway.request_timeout_secs),
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("network.poll_interval_secs", self.network.poll_interval_secs),
            ("backoff.initial_ms", self.backoff.initial_ms),
        ];
        if let Some((key, _)) = durations.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Message(format!("{key} must be greater than zero")));
        }
        if self.backoff.max_ms < self.backoff.initial_ms {
            return Err(ConfigError::Message(
                "backoff.max_ms must not be below backoff.initial_ms".to_string(),
            ));
        }
        if !(1.0..).contains(&self.backoff.multiplier) {
            return Err(ConfigError::Message(
                "backoff.multiplier must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(ConfigError::Message(
                "backoff.jitter must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            address: self.gateway.address.clone(),
            auth_dir: self.auth_dir.clone(),
            connect_timeout: Duration::from_secs(self.gateway.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.gateway.request_timeout_secs),
        }
    }

    pub fn network_monitor(&self) -> NetworkMonitor {
        let poll_interval = Duration::from_secs(self.network.poll_interval_secs);
        let probe = DnsProbe::new(self.network.probe_host.clone(), poll_interval);
        NetworkMonitor::new(Arc::new(probe), poll_interval)
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            backoff: BackoffPolicy {
                initial_delay: Duration::from_millis(self.backoff.initial_ms),
                max_delay: Duration::from_millis(self.backoff.max_ms),
                multiplier: self.backoff.multiplier,
                jitter: self.backoff.jitter,
            },
        }
    }
}
