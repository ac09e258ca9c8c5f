//! Device probe implementations.
//!
//! This module contains the built-in probes:
//!
//! - [`multiplexer`] - PCA9548A control register readback
//! - [`sht3x`] - Sensirion SHT3x temperature/humidity sensor
//! - [`bmx280`] - Bosch BMP280/BME280 pressure sensor
//! - [`sh1106`] - SH1106/SH1107 OLED controller
//!
//! # Adding New Probes
//!
//! 1. Create a new submodule under `probes/`
//! 2. Implement the `DeviceProbe` trait from `hwdiag_common::device::probe`
//! 3. Register its factory in [`register_all_probes`] under a kind name
//! 4. Reference the kind from a `[[test]]` entry

pub mod bmx280;
mod device;
pub mod multiplexer;
pub mod sh1106;
pub mod sht3x;

use crate::probe_registry::ProbeRegistry;
use hwdiag_common::prelude::*;
use std::ops::RangeInclusive;

/// Register every built-in probe.
pub fn register_all_probes(registry: &mut ProbeRegistry) {
    registry.register(PROBE_MULTIPLEXER, multiplexer::create_probe);
    registry.register(PROBE_SHT3X, sht3x::create_probe);
    registry.register(PROBE_BMX280, bmx280::create_probe);
    registry.register(PROBE_SH1106, sh1106::create_probe);
}

/// Reject a measurement outside its physical range.
fn check_range(
    quantity: &str,
    value: f64,
    range: RangeInclusive<f64>,
    unit: &str,
) -> Result<f64, ProbeError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ProbeError::ImplausibleReading(format!(
            "{quantity} {value:.1} {unit} outside {:.0}..{:.0} {unit}",
            range.start(),
            range.end()
        )))
    }
}
