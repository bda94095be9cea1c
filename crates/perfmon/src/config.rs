//! Configuration file support for perfmon
//!
//! Loads and validates perfmon configuration from TOML files.
//! Default location: /etc/sonic/perfmon.toml

use crate::error::{PerfMonError, Result};
use crate::monitor::MonitorSettings;
use crate::simulator::DeviceModel;
use crate::types::{ChannelIds, CounterIndex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/perfmon.toml";

/// Reader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Indication channel id
    #[serde(default = "default_indication_id")]
    pub indication_id: u32,

    /// Request channel id
    #[serde(default = "default_request_id")]
    pub request_id: u32,

    /// Response timeout in milliseconds, 0 waits forever
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,

    /// Log every counter read
    #[serde(default)]
    pub verbose: bool,
}

/// Simulated device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Delay before each indication in microseconds
    #[serde(default)]
    pub latency_us: u64,

    /// Per-read advance while counting is enabled
    #[serde(default = "default_increment")]
    pub increment: u64,

    /// Counter indices the device never answers
    #[serde(default)]
    pub silent_indices: Vec<String>,

    /// Per-counter answer delay in microseconds, keyed by index
    #[serde(default)]
    pub slow_counters_us: BTreeMap<String, u64>,

    /// Initial counter values keyed by index
    #[serde(default)]
    pub counters: BTreeMap<String, u64>,
}

/// Complete perfmon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerfMonConfig {
    /// Reader configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Simulated device configuration
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

// Default functions
fn default_indication_id() -> u32 {
    5
}

fn default_request_id() -> u32 {
    6
}

fn default_response_timeout() -> u64 {
    1000
}

fn default_increment() -> u64 {
    1
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            indication_id: default_indication_id(),
            request_id: default_request_id(),
            response_timeout_ms: default_response_timeout(),
            verbose: false,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            latency_us: 0,
            increment: default_increment(),
            silent_indices: Vec::new(),
            slow_counters_us: BTreeMap::new(),
            counters: BTreeMap::new(),
        }
    }
}

impl SimulatorConfig {
    /// Build the device model described by this section
    pub fn model(&self) -> Result<DeviceModel> {
        let mut model = DeviceModel::new()
            .with_latency(Duration::from_micros(self.latency_us))
            .with_increment(self.increment);

        for (key, value) in &self.counters {
            model = model.with_counter(parse_key(key)?, *value);
        }
        for key in &self.silent_indices {
            model = model.with_silent(parse_key(key)?);
        }
        for (key, latency_us) in &self.slow_counters_us {
            model = model
                .with_counter_latency(parse_key(key)?, Duration::from_micros(*latency_us));
        }

        Ok(model)
    }
}

fn parse_key(key: &str) -> Result<CounterIndex> {
    key.parse::<CounterIndex>().map_err(|e| {
        PerfMonError::Configuration(format!("simulator counter key '{}': {}", key, e))
    })
}

impl PerfMonConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config = toml::from_str(&content).map_err(|e| {
                    PerfMonError::Configuration(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(PerfMonError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            PerfMonError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }

    /// Response timeout, `None` when configured to wait forever
    pub fn response_timeout(&self) -> Option<Duration> {
        match self.monitor.response_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn channels(&self) -> ChannelIds {
        ChannelIds::new(self.monitor.indication_id, self.monitor.request_id)
    }

    /// Reader settings derived from this configuration
    pub fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            channels: self.channels(),
            response_timeout: self.response_timeout(),
            verbose: self.monitor.verbose,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.monitor.indication_id == self.monitor.request_id {
            return Err(PerfMonError::Configuration(
                "indication_id and request_id must differ".to_string(),
            ));
        }

        if self.simulator.increment == 0 {
            return Err(PerfMonError::Configuration(
                "simulator increment must be > 0".to_string(),
            ));
        }

        self.simulator.model()?;

        Ok(())
    }
}
