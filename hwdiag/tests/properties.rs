//! Property tests over randomly generated plans.
//!
//! Every plan runs against a simulated bus in which "present" units have a
//! healthy device and "absent" units point at an empty address.

use hwdiag::core::{DiagCore, SilentObserver};
use hwdiag::mux::Pca9548a;
use hwdiag::probe_registry::ProbeRegistry;
use hwdiag::sim::SimulatedBus;
use hwdiag_common::prelude::*;
use proptest::prelude::*;

const PRESENT_SHT: u8 = 0x44;
const ABSENT_SHT: u8 = 0x45;
const OLED: u8 = 0x3C;

#[derive(Debug, Clone)]
struct UnitShape {
    kind: u8,
    channel: u8,
    critical: bool,
    enabled: bool,
    visual: bool,
}

fn unit_shape() -> impl Strategy<Value = UnitShape> {
    (0u8..3, 0u8..MUX_CHANNELS, any::<bool>(), prop::bool::weighted(0.8), any::<bool>()).prop_map(
        |(kind, channel, critical, enabled, visual)| UnitShape {
            kind,
            channel,
            critical,
            enabled,
            visual,
        },
    )
}

fn build(shapes: &[UnitShape]) -> (DiagConfig, SimulatedBus) {
    let mut config = DiagConfig::reference_board();
    config.bus.settle_ms = 0;
    config.tests.clear();

    let mut bus = SimulatedBus::new(DEFAULT_MUX_ADDRESS);
    for (i, shape) in shapes.iter().enumerate() {
        let name = format!("unit{i}");
        let mut unit = match shape.kind {
            0 => {
                bus = bus.with_sht3x(shape.channel, PRESENT_SHT, 21.0, 50.0);
                DeviceConfig::new(name, PROBE_SHT3X, shape.channel, PRESENT_SHT)
            }
            1 => DeviceConfig::new(name, PROBE_SHT3X, shape.channel, ABSENT_SHT),
            _ => {
                bus = bus.with_sh1106(shape.channel, OLED);
                let mut args = ProbeArgs::new();
                args.insert("hold_ms".to_string(), toml::Value::Integer(0));
                DeviceConfig::new(name, PROBE_SH1106, shape.channel, OLED).with_args(args)
            }
        };
        unit.critical = shape.critical;
        unit.enabled = shape.enabled;
        unit.visual = shape.visual;
        config.tests.push(unit);
    }
    (config, bus)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn run_report_invariants(
        shapes in prop::collection::vec(unit_shape(), 0..7),
        quick in any::<bool>(),
    ) {
        let (config, bus) = build(&shapes);
        let log = bus.log();
        let mux = Pca9548a::from_config(bus, &config.bus);
        let mut core = DiagCore::new(config.clone(), Box::new(mux), ProbeRegistry::with_builtin())
            .expect("generated plan is valid");

        let report = core.run(quick, &mut SilentObserver);

        let eligible: Vec<&DeviceConfig> = config
            .tests
            .iter()
            .filter(|u| u.enabled && !(quick && u.visual))
            .collect();

        // Executed units are a prefix of the eligible units, in order.
        prop_assert!(report.results.len() <= eligible.len());
        for (result, unit) in report.results.iter().zip(&eligible) {
            prop_assert_eq!(result.name(), unit.name.as_str());
        }

        // Excluded units are exactly the complement, with the right reason.
        prop_assert_eq!(report.skipped.len(), config.tests.len() - eligible.len());
        for skipped in &report.skipped {
            let unit = config.unit(&skipped.name).unwrap();
            let expected = if !unit.enabled { SkipReason::Disabled } else { SkipReason::QuickMode };
            prop_assert_eq!(skipped.reason, expected);
        }

        // Only the last executed unit may abort, and only then does the run stop early.
        let abort_at = report.results.iter().position(TestResult::aborts_run);
        match (&report.termination, abort_at) {
            (Termination::Completed, None) => {
                prop_assert_eq!(report.results.len(), eligible.len());
            }
            (Termination::AbortedCritical { unit, position }, Some(idx)) => {
                prop_assert_eq!(idx + 1, report.results.len());
                prop_assert_eq!(*position, report.results.len());
                prop_assert_eq!(unit.as_str(), report.results[idx].name());
            }
            (termination, idx) => {
                prop_assert!(false, "termination {:?} with abort index {:?}", termination, idx);
            }
        }

        // Verdict is fail iff any executed unit failed.
        let any_failed = report.results.iter().any(TestResult::counts_toward_failure);
        prop_assert_eq!(report.status == RunStatus::Fail, any_failed);

        // Absent units fail, present ones pass.
        for result in &report.results {
            let expected = if result.config.address == ABSENT_SHT {
                TestStatus::Fail
            } else {
                TestStatus::Pass
            };
            prop_assert_eq!(result.status(), expected);
        }

        // Device traffic only ever happens with a single channel routed.
        for event in log.lock().iter().filter(|e| e.address != DEFAULT_MUX_ADDRESS) {
            prop_assert!(event.control.only_channel().is_some());
        }
    }
}
