//! PCA9548A readback probe.
//!
//! The multiplexer is addressed on the root bus, so it answers regardless of
//! the routed channel. Reading its control register back proves it latched
//! the one-hot mask written by the preceding select.

use super::device::Device;
use hwdiag_common::prelude::*;
use serde_json::json;

/// Control register readback check.
pub struct MultiplexerProbe;

/// Factory registered under `multiplexer`.
pub fn create_probe() -> Box<dyn DeviceProbe> {
    Box::new(MultiplexerProbe)
}

impl DeviceProbe for MultiplexerProbe {
    fn kind(&self) -> &'static str {
        PROBE_MULTIPLEXER
    }

    fn probe(
        &self,
        bus: &mut dyn DeviceBus,
        target: &ProbeTarget<'_>,
    ) -> Result<ProbeReport, ProbeError> {
        let expected = ChannelMask::single(target.channel).ok_or(ProbeError::InvalidChannel {
            channel: target.channel,
        })?;

        let mut device = Device::new(bus, target.address);
        let mut control = [0u8; 1];
        device.read(&mut control)?;

        if control[0] != expected.bits() {
            return Err(ProbeError::ImplausibleReading(format!(
                "control register 0x{:02X}, expected 0x{:02X}",
                control[0],
                expected.bits()
            )));
        }

        Ok(
            ProbeReport::new(format!("PCA9548A routing channel {}", target.channel)).with_payload(
                json!({
                    "control": control[0],
                    "channel": target.channel,
                }),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::{ChannelSelector, Pca9548a};
    use crate::sim::SimulatedBus;
    use std::time::Duration;

    fn mux() -> Pca9548a<SimulatedBus> {
        Pca9548a::new(SimulatedBus::new(DEFAULT_MUX_ADDRESS), DEFAULT_MUX_ADDRESS)
            .with_settle(Duration::ZERO)
    }

    #[test]
    fn readback_matches_selected_channel() {
        let unit = DeviceConfig::new("mux", PROBE_MULTIPLEXER, 4, DEFAULT_MUX_ADDRESS);
        let mut selector = mux();
        let bus = selector.select(4).unwrap();

        let report = MultiplexerProbe
            .probe(bus, &ProbeTarget::for_unit(&unit))
            .unwrap();
        let payload = report.payload.unwrap();
        assert_eq!(payload["control"], 0x10);
        assert_eq!(payload["channel"], 4);
    }

    #[test]
    fn readback_mismatch_is_implausible() {
        // Channel 1 routed, unit claims channel 0.
        let unit = DeviceConfig::new("mux", PROBE_MULTIPLEXER, 0, DEFAULT_MUX_ADDRESS);
        let mut selector = mux();
        let bus = selector.select(1).unwrap();

        let err = MultiplexerProbe
            .probe(bus, &ProbeTarget::for_unit(&unit))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ImplausibleReading);
    }

    #[test]
    fn wrong_address_is_not_present() {
        let unit = DeviceConfig::new("mux", PROBE_MULTIPLEXER, 0, 0x71);
        let mut selector = mux();
        let bus = selector.select(0).unwrap();

        let err = MultiplexerProbe
            .probe(bus, &ProbeTarget::for_unit(&unit))
            .unwrap_err();
        assert_eq!(err, ProbeError::NotPresent { address: 0x71 });
    }
}
