//! Test unit: one configured device bound to its probe.

use crate::mux::ChannelSelector;
use crate::probe_registry::ProbeRegistry;
use hwdiag_common::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, error, warn};

/// A `[[test]]` entry bound to the probe for its kind.
pub struct TestUnit {
    config: DeviceConfig,
    probe: Result<Box<dyn DeviceProbe>, ProbeError>,
}

impl TestUnit {
    /// Bind a unit to its probe.
    ///
    /// An unknown probe kind is not an error here; the unit fails when run.
    pub fn bind(config: DeviceConfig, registry: &ProbeRegistry) -> Self {
        let probe = registry.create(&config.probe);
        Self { config, probe }
    }

    /// Unit configuration.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Run the unit against the multiplexer.
    ///
    /// Never fails: every select, probe or release problem ends up in the
    /// returned record. The selector is released after every attempt that
    /// reached it.
    pub fn run(&self, selector: &mut dyn ChannelSelector) -> TestResult {
        let started = Instant::now();

        let outcome = if !self.config.enabled {
            ProbeOutcome::skipped("Disabled")
        } else {
            match &self.probe {
                Err(err) => ProbeOutcome::failed(err.clone()),
                Ok(probe) => {
                    let outcome = self.select_and_probe(probe.as_ref(), selector);
                    if let Err(e) = selector.release() {
                        warn!("Failed to release multiplexer after '{}': {}", self.config.name, e);
                    }
                    outcome
                }
            }
        };

        debug!(
            "Unit '{}' finished: {:?} ({})",
            self.config.name, outcome.status, outcome.message
        );
        TestResult::new(self.config.clone(), outcome, started.elapsed())
    }

    fn select_and_probe(
        &self,
        probe: &dyn DeviceProbe,
        selector: &mut dyn ChannelSelector,
    ) -> ProbeOutcome {
        let bus = match selector.select(self.config.channel) {
            Ok(bus) => bus,
            Err(e) => {
                warn!(
                    "Select of channel {} for '{}' failed: {}",
                    self.config.channel, self.config.name, e
                );
                return ProbeOutcome::failed(e.into());
            }
        };

        let target = ProbeTarget::for_unit(&self.config);
        match panic::catch_unwind(AssertUnwindSafe(|| probe.probe(bus, &target))) {
            Ok(result) => ProbeOutcome::from_result(result),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Probe '{}' panicked: {}", probe.kind(), message);
                ProbeOutcome::failed(ProbeError::UnexpectedFault(format!(
                    "probe panicked: {message}"
                )))
            }
        }
    }
}

/// Text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::{Pca9548a, SelectError};
    use crate::sim::SimulatedBus;
    use std::time::Duration;

    struct PanickingProbe;

    impl DeviceProbe for PanickingProbe {
        fn kind(&self) -> &'static str {
            "panicking"
        }

        fn probe(
            &self,
            _bus: &mut dyn DeviceBus,
            _target: &ProbeTarget<'_>,
        ) -> Result<ProbeReport, ProbeError> {
            panic!("register map exhausted");
        }
    }

    fn create_panicking_probe() -> Box<dyn DeviceProbe> {
        Box::new(PanickingProbe)
    }

    /// Selector that counts calls and refuses nothing.
    #[derive(Default)]
    struct CountingSelector {
        bus: Option<SimulatedBus>,
        selects: Vec<u8>,
        releases: usize,
    }

    impl ChannelSelector for CountingSelector {
        fn select(&mut self, channel: u8) -> Result<&mut dyn DeviceBus, SelectError> {
            self.selects.push(channel);
            let bus = self.bus.get_or_insert_with(|| SimulatedBus::new(DEFAULT_MUX_ADDRESS));
            Ok(bus)
        }

        fn release(&mut self) -> Result<(), SelectError> {
            self.releases += 1;
            Ok(())
        }

        fn active_channel(&self) -> Option<u8> {
            None
        }
    }

    fn registry() -> ProbeRegistry {
        let mut registry = ProbeRegistry::with_builtin();
        registry.register("panicking", create_panicking_probe);
        registry
    }

    #[test]
    fn disabled_unit_never_touches_selector() {
        let unit = TestUnit::bind(
            DeviceConfig::new("oled", PROBE_SH1106, 2, 0x3D).disabled(),
            &registry(),
        );
        let mut selector = CountingSelector::default();

        let result = unit.run(&mut selector);
        assert_eq!(result.status(), TestStatus::Skipped);
        assert!(selector.selects.is_empty());
        assert_eq!(selector.releases, 0);
    }

    #[test]
    fn panic_becomes_unexpected_fault() {
        let unit = TestUnit::bind(DeviceConfig::new("bad", "panicking", 1, 0x10), &registry());
        let mut selector = CountingSelector::default();

        let result = unit.run(&mut selector);
        assert_eq!(result.outcome.failure_kind(), Some(FailureKind::UnexpectedFault));
        assert!(
            result
                .outcome
                .error
                .as_ref()
                .is_some_and(|e| e.to_string().contains("register map exhausted"))
        );
        assert_eq!(selector.selects, vec![1]);
        assert_eq!(selector.releases, 1);
    }

    #[test]
    fn unknown_kind_fails_without_select() {
        let unit = TestUnit::bind(DeviceConfig::new("lidar", "vl53l0x", 4, 0x29), &registry());
        let mut selector = CountingSelector::default();

        let result = unit.run(&mut selector);
        assert_eq!(result.outcome.failure_kind(), Some(FailureKind::UnexpectedFault));
        assert!(result.outcome.error.unwrap().to_string().contains("no probe registered"));
        assert!(selector.selects.is_empty());
    }

    #[test]
    fn invalid_channel_never_probes() {
        let bus = SimulatedBus::new(DEFAULT_MUX_ADDRESS).with_sht3x(1, 0x44, 20.0, 40.0);
        let log = bus.log();
        let mut mux = Pca9548a::new(bus, DEFAULT_MUX_ADDRESS).with_settle(Duration::ZERO);
        let unit = TestUnit::bind(DeviceConfig::new("ghost", PROBE_SHT3X, 9, 0x44), &registry());

        let result = unit.run(&mut mux);
        assert_eq!(
            result.outcome.error,
            Some(ProbeError::InvalidChannel { channel: 9 })
        );
        assert!(log.lock().iter().all(|e| e.address == DEFAULT_MUX_ADDRESS));
        assert_eq!(mux.active_channel(), None);
    }

    #[test]
    fn passing_unit_releases_mux() {
        let bus = SimulatedBus::new(DEFAULT_MUX_ADDRESS).with_sht3x(1, 0x44, 20.0, 40.0);
        let mut mux = Pca9548a::new(bus, DEFAULT_MUX_ADDRESS).with_settle(Duration::ZERO);
        let unit = TestUnit::bind(DeviceConfig::new("sht", PROBE_SHT3X, 1, 0x44), &registry());

        let result = unit.run(&mut mux);
        assert_eq!(result.status(), TestStatus::Pass, "{:?}", result.outcome);
        assert_eq!(mux.inner().control(), ChannelMask::empty());
        assert!(result.elapsed > Duration::ZERO);
    }

    #[test]
    fn panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u32), "non-string panic payload");
    }
}
