//! Device and bus constants.
//!
//! Addresses, channel counts and physical plausibility limits shared by the
//! channel selector, the probes and the simulated bus.

use std::ops::RangeInclusive;

/// Canonical service name (report headers, default `[shared]` section).
pub const SERVICE_NAME: &str = "hwdiag";

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hwdiag/diagnostics.toml";

/// Default I2C character device (Raspberry Pi header bus)
pub const DEFAULT_BUS_DEVICE: &str = "/dev/i2c-1";

/// Default PCA9548A address (A0..A2 strapped low)
pub const DEFAULT_MUX_ADDRESS: u8 = 0x70;

/// Number of downstream channels on the multiplexer
pub const MUX_CHANNELS: u8 = 8;

/// Highest valid 7-bit bus address
pub const MAX_ADDRESS: u8 = 0x7F;

/// Delay after a channel switch before the downstream bus is used
pub const DEFAULT_SETTLE_MS: u64 = 20;

/// Default adapter timeout for a single transfer
pub const DEFAULT_BUS_TIMEOUT_MS: u64 = 100;

/// Addresses probed by a channel scan (reserved ranges excluded)
pub const SCAN_ADDRESSES: RangeInclusive<u8> = 0x03..=0x77;

// ─── Probe kinds ────────────────────────────────────────────────────

/// PCA9548A control register readback
pub const PROBE_MULTIPLEXER: &str = "multiplexer";
/// Sensirion SHT3x temperature/humidity sensor
pub const PROBE_SHT3X: &str = "sht3x";
/// Bosch BMP280/BME280 pressure sensor
pub const PROBE_BMX280: &str = "bmx280";
/// SH1106/SH1107 OLED controller
pub const PROBE_SH1106: &str = "sh1106";

// ─── Plausibility limits ────────────────────────────────────────────

/// Temperature range accepted from any supported sensor family (°C)
pub const TEMPERATURE_RANGE_C: RangeInclusive<f64> = -40.0..=125.0;

/// Relative humidity range (%)
pub const HUMIDITY_RANGE_PCT: RangeInclusive<f64> = 0.0..=100.0;

/// Barometric pressure range of the BMx280 family (hPa)
pub const PRESSURE_RANGE_HPA: RangeInclusive<f64> = 300.0..=1100.0;
