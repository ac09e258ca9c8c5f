//! Diagnostic plan configuration.
//!
//! This module contains the configuration types loaded from
//! `diagnostics.toml`:
//! - `DiagConfig` - Top-level file (shared section, bus, ordered test units)
//! - `BusConfig` - Bus device and multiplexer settings
//! - `DeviceConfig` - One test unit (probe kind, channel, address, flags)

use crate::config::{ConfigError, SharedConfig};
use crate::device::consts::{
    DEFAULT_BUS_DEVICE, DEFAULT_BUS_TIMEOUT_MS, DEFAULT_MUX_ADDRESS, DEFAULT_SETTLE_MS,
    MAX_ADDRESS, PROBE_BMX280, PROBE_MULTIPLEXER, PROBE_SH1106, PROBE_SHT3X,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Free-form per-probe arguments (`[test.args]` table).
pub type ProbeArgs = toml::Table;

fn default_true() -> bool {
    true
}

fn default_bus_device() -> PathBuf {
    PathBuf::from(DEFAULT_BUS_DEVICE)
}

fn default_mux_address() -> u8 {
    DEFAULT_MUX_ADDRESS
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_MS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_BUS_TIMEOUT_MS
}

/// Main configuration loaded from `diagnostics.toml`.
///
/// Units run in the order they are declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiagConfig {
    /// Service name and log level.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Bus and multiplexer settings.
    #[serde(default)]
    pub bus: BusConfig,

    /// Ordered test units (`[[test]]`).
    #[serde(default, rename = "test")]
    pub tests: Vec<DeviceConfig>,
}

impl DiagConfig {
    /// Validate the plan.
    ///
    /// # Validation Rules
    /// 1. `shared` section valid
    /// 2. multiplexer address is 7-bit
    /// 3. unit names non-empty and unique
    /// 4. probe kind non-empty
    /// 5. unit addresses are 7-bit
    ///
    /// Channel range is not checked here: an out-of-range channel fails its
    /// own unit with `InvalidChannel` when the run selects it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.bus.mux_address > MAX_ADDRESS {
            return Err(ConfigError::ValidationError(format!(
                "mux_address 0x{:02X} is not a 7-bit address",
                self.bus.mux_address
            )));
        }

        let mut names = HashSet::new();
        for unit in &self.tests {
            if unit.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "test name cannot be empty".to_string(),
                ));
            }
            if !names.insert(unit.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate test name: {}",
                    unit.name
                )));
            }
            if unit.probe.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "test '{}' has an empty probe kind",
                    unit.name
                )));
            }
            if unit.address > MAX_ADDRESS {
                return Err(ConfigError::ValidationError(format!(
                    "test '{}': address 0x{:02X} is not a 7-bit address",
                    unit.name, unit.address
                )));
            }
        }

        Ok(())
    }

    /// Look up a unit by name.
    pub fn unit(&self, name: &str) -> Option<&DeviceConfig> {
        self.tests.iter().find(|unit| unit.name == name)
    }

    /// Built-in plan for the reference board.
    ///
    /// PCA9548A at 0x70, SHT31 on channel 0, BMP280 on channel 1 and two
    /// 128x128 SH1107 panels on channels 2 and 3. Matches the shipped
    /// `config/diagnostics.toml`.
    pub fn reference_board() -> Self {
        let mut oled_args = ProbeArgs::new();
        oled_args.insert("height".to_string(), toml::Value::Integer(128));
        oled_args.insert("hold_ms".to_string(), toml::Value::Integer(1500));

        Self {
            shared: SharedConfig::default(),
            bus: BusConfig::default(),
            tests: vec![
                DeviceConfig::new("I2C Multiplexer", PROBE_MULTIPLEXER, 0, DEFAULT_MUX_ADDRESS)
                    .critical(),
                DeviceConfig::new("SHT31 Temperature/Humidity", PROBE_SHT3X, 0, 0x44),
                DeviceConfig::new("BMP280 Pressure", PROBE_BMX280, 1, 0x76),
                DeviceConfig::new("OLED 1", PROBE_SH1106, 2, 0x3D)
                    .visual()
                    .with_args(oled_args.clone()),
                DeviceConfig::new("OLED 2", PROBE_SH1106, 3, 0x3C)
                    .visual()
                    .with_args(oled_args),
            ],
        }
    }
}

impl Default for DiagConfig {
    fn default() -> Self {
        Self::reference_board()
    }
}

/// Bus device and multiplexer settings (`[bus]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// I2C character device.
    #[serde(default = "default_bus_device")]
    pub device: PathBuf,

    /// Multiplexer address on the root bus.
    #[serde(default = "default_mux_address")]
    pub mux_address: u8,

    /// Wait after each channel switch (milliseconds).
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Adapter timeout per transfer (milliseconds).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl BusConfig {
    /// Channel switch settle time.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Adapter timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device: default_bus_device(),
            mux_address: DEFAULT_MUX_ADDRESS,
            settle_ms: DEFAULT_SETTLE_MS,
            timeout_ms: DEFAULT_BUS_TIMEOUT_MS,
        }
    }
}

/// One test unit (`[[test]]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Display name, unique within the plan.
    pub name: String,

    /// Registered probe kind (e.g. "sht3x").
    pub probe: String,

    /// Multiplexer channel the device hangs off.
    pub channel: u8,

    /// 7-bit device address.
    pub address: u8,

    /// A failure aborts the rest of the run.
    #[serde(default)]
    pub critical: bool,

    /// Disabled units are never selected or probed.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Slow or visual check, excluded in quick mode.
    #[serde(default)]
    pub visual: bool,

    /// Probe-specific arguments.
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub args: ProbeArgs,
}

impl DeviceConfig {
    /// Enabled, non-critical, non-visual unit without arguments.
    pub fn new(name: impl Into<String>, probe: impl Into<String>, channel: u8, address: u8) -> Self {
        Self {
            name: name.into(),
            probe: probe.into(),
            channel,
            address,
            critical: false,
            enabled: true,
            visual: false,
            args: ProbeArgs::new(),
        }
    }

    /// Mark the unit critical.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Mark the unit disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Mark the unit visual/slow.
    pub fn visual(mut self) -> Self {
        self.visual = true;
        self
    }

    /// Replace the argument table.
    pub fn with_args(mut self, args: ProbeArgs) -> Self {
        self.args = args;
        self
    }

    /// Integer argument, falling back to `default` when absent or not a
    /// non-negative integer.
    pub fn arg_u64(&self, key: &str, default: u64) -> u64 {
        arg_u64(&self.args, key, default)
    }
}

/// Integer lookup in a probe argument table.
pub fn arg_u64(args: &ProbeArgs, key: &str, default: u64) -> u64 {
    args.get(key)
        .and_then(toml::Value::as_integer)
        .and_then(|v| u64::try_from(v).ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_board_is_valid() {
        let config = DiagConfig::reference_board();
        assert!(config.validate().is_ok());
        assert_eq!(config.tests.len(), 5);
        assert!(config.tests[0].critical);
        assert!(config.tests[1..].iter().all(|t| !t.critical));
        assert_eq!(config.tests[3].arg_u64("height", 64), 128);
        assert!(config.tests[3..].iter().all(|t| t.visual));
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut config = DiagConfig::reference_board();
        config.tests[2].name = config.tests[1].name.clone();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("Duplicate")
        ));
    }

    #[test]
    fn eight_bit_address_rejected() {
        let mut config = DiagConfig::reference_board();
        config.tests[1].address = 0x90;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_channel_left_to_selector() {
        let mut config = DiagConfig::reference_board();
        config.tests[1].channel = 9;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn arg_lookup_falls_back() {
        let mut args = ProbeArgs::new();
        args.insert("hold_ms".to_string(), toml::Value::Integer(250));
        args.insert("negative".to_string(), toml::Value::Integer(-1));
        args.insert("text".to_string(), toml::Value::String("x".to_string()));
        assert_eq!(arg_u64(&args, "hold_ms", 0), 250);
        assert_eq!(arg_u64(&args, "negative", 7), 7);
        assert_eq!(arg_u64(&args, "text", 7), 7);
        assert_eq!(arg_u64(&args, "missing", 7), 7);
    }
}
