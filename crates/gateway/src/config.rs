//! Gateway Configuration
//!
//! Layered: serde defaults, then an optional file (format from its
//! extension), then `CANELM_*` environment variables with `__` between
//! nesting levels, e.g. `CANELM_TCP__BIND=127.0.0.1:35000`.

use crate::error::GatewayError;
use can_bus::{SimulatorConfig, DEFAULT_QUEUE_CAPACITY, REPORT_INTERVAL};
use elm_protocol::MonitorSettings;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tcp: TcpSettings,
    pub serial: SerialSettings,
    pub bus: BusSettings,
    pub simulator: SimulatorSettings,
    pub monitor: MonitorConfig,
    pub log: LogSettings,
    pub metrics: MetricsSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TcpSettings {
    pub enabled: bool,
    pub bind: String,
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:35000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub enabled: bool,
    pub device: String,
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 38400,
        }
    }
}

/// Frame source backing the bus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusDriverKind {
    /// No bus attached
    #[default]
    None,
    /// Replay a candump log
    Replay,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    pub driver: BusDriverKind,
    pub replay_path: Option<PathBuf>,
    pub replay_loop: bool,
    pub replay_interval_ms: u64,
    /// Health check and throughput report period
    pub report_interval_ms: u64,
}

impl BusSettings {
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            driver: BusDriverKind::None,
            replay_path: None,
            replay_loop: true,
            replay_interval_ms: 10,
            report_interval_ms: REPORT_INTERVAL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    /// Start the drive-profile generator at boot
    pub autostart: bool,
    pub tick_ms: u64,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            autostart: false,
            tick_ms: SimulatorConfig::default().tick_ms,
        }
    }
}

impl SimulatorSettings {
    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            tick_ms: self.tick_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub queue_capacity: usize,
    pub poll_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_ms: 100,
        }
    }
}

impl MonitorConfig {
    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            queue_capacity: self.queue_capacity,
            poll_interval: Duration::from_millis(self.poll_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directives, e.g. `info,can_bus=debug`
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Prometheus scrape endpoint; disabled when absent
    pub listen: Option<SocketAddr>,
}

impl Settings {
    /// Load settings from an optional file plus the environment
    pub fn load(path: Option<&str>) -> Result<Self, GatewayError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix("CANELM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.bus.driver == BusDriverKind::Replay && self.bus.replay_path.is_none() {
            return Err(GatewayError::InvalidSetting(
                "bus.replay_path is required for the replay driver".to_string(),
            ));
        }
        if self.monitor.queue_capacity == 0 {
            return Err(GatewayError::InvalidSetting(
                "monitor.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.monitor.poll_ms == 0 || self.simulator.tick_ms == 0 || self.bus.report_interval_ms == 0 {
            return Err(GatewayError::InvalidSetting(
                "monitor.poll_ms, simulator.tick_ms and bus.report_interval_ms must be non-zero"
                    .to_string(),
            ));
        }
        if !self.tcp.enabled && !self.serial.enabled {
            return Err(GatewayError::InvalidSetting(
                "at least one of tcp or serial must be enabled".to_string(),
            ));
        }
        Ok(())
    }
}
