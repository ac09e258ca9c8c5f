//! Diagnostic core and run state machine.
//!
//! The `DiagCore` struct is the main entry point for a diagnostic run. It
//! owns the multiplexer, the probe registry and the plan, and sequences the
//! units against the shared bus.

use crate::mux::{ChannelSelector, Pca9548a};
use crate::probe_registry::ProbeRegistry;
use crate::report::Reporter;
use crate::sim::SimulatedBus;
use crate::unit::TestUnit;
use chrono::Local;
use hwdiag_common::prelude::*;
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle of a `DiagCore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Constructed, nothing run yet
    Idle,
    /// Iterating units
    Running,
    /// Every planned unit executed
    Completed,
    /// A critical unit failed and the run stopped
    AbortedCritical,
}

/// Live progress callbacks for a run.
///
/// All methods default to no-ops.
pub trait RunObserver {
    /// Run starting with `planned` units; `excluded` were filtered out.
    fn on_run_start(&mut self, _service: &str, _planned: usize, _excluded: &[SkippedUnit]) {}

    /// Unit `position` of `total` (1-based) is about to run.
    fn on_unit_start(&mut self, _position: usize, _total: usize, _unit: &DeviceConfig) {}

    /// Unit `position` of `total` finished.
    fn on_unit_finished(&mut self, _position: usize, _total: usize, _result: &TestResult) {}

    /// A critical unit failed; `remaining` units will not run.
    fn on_abort(&mut self, _result: &TestResult, _remaining: usize) {}
}

/// Observer that ignores every event.
pub struct SilentObserver;

impl RunObserver for SilentObserver {}

/// Reason a unit is left out of a run, if any.
///
/// Disabled units and, in quick mode, visual units are excluded by the same
/// filter.
pub fn exclusion(unit: &DeviceConfig, quick: bool) -> Option<SkipReason> {
    if !unit.enabled {
        Some(SkipReason::Disabled)
    } else if quick && unit.visual {
        Some(SkipReason::QuickMode)
    } else {
        None
    }
}

/// Split a plan into the units to run, in declaration order, and the
/// excluded ones.
pub fn partition_plan(units: &[DeviceConfig], quick: bool) -> (Vec<&DeviceConfig>, Vec<SkippedUnit>) {
    let mut planned = Vec::with_capacity(units.len());
    let mut skipped = Vec::new();
    for unit in units {
        match exclusion(unit, quick) {
            None => planned.push(unit),
            Some(reason) => skipped.push(SkippedUnit {
                name: unit.name.clone(),
                reason,
            }),
        }
    }
    (planned, skipped)
}

/// Diagnostic core: owns the multiplexer and runs the plan.
pub struct DiagCore {
    /// Validated plan
    config: DiagConfig,
    /// Shared multiplexer
    selector: Box<dyn ChannelSelector>,
    /// Probe factories by kind
    registry: ProbeRegistry,
    /// Lifecycle state
    state: RunState,
}

impl DiagCore {
    /// Create a new DiagCore.
    ///
    /// # Arguments
    /// * `config` - Plan loaded from TOML or built in
    /// * `selector` - Multiplexer the units share
    /// * `registry` - Probe factories
    ///
    /// # Errors
    /// Returns error if plan validation fails.
    pub fn new(
        config: DiagConfig,
        selector: Box<dyn ChannelSelector>,
        registry: ProbeRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let unknown: Vec<&str> = config
            .tests
            .iter()
            .filter(|t| !registry.contains(&t.probe))
            .map(|t| t.name.as_str())
            .collect();
        if !unknown.is_empty() {
            warn!("Units without a registered probe will fail: {:?}", unknown);
        }

        info!(
            "DiagCore created with {} units (mux 0x{:02X} on {})",
            config.tests.len(),
            config.bus.mux_address,
            config.bus.device.display()
        );

        Ok(Self {
            config,
            selector,
            registry,
            state: RunState::Idle,
        })
    }

    /// Load and validate a plan.
    ///
    /// A missing file at the default path falls back to the built-in plan
    /// for the reference board; a missing explicit path is an error.
    pub fn load_config(path: &Path) -> Result<DiagConfig, ConfigError> {
        info!("Loading diagnostic plan from {:?}", path);

        let config = match DiagConfig::load(path) {
            Ok(config) => config,
            Err(ConfigError::FileNotFound) if path == Path::new(DEFAULT_CONFIG_PATH) => {
                info!("No plan at {:?}, using built-in reference board plan", path);
                DiagConfig::reference_board()
            }
            Err(e) => return Err(e),
        };
        config.validate()?;

        info!("Loaded plan with {} units", config.tests.len());
        Ok(config)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// The plan.
    pub fn config(&self) -> &DiagConfig {
        &self.config
    }

    /// The probe registry.
    pub fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    /// The multiplexer, for callers that drive it directly (channel scan).
    pub fn selector_mut(&mut self) -> &mut dyn ChannelSelector {
        self.selector.as_mut()
    }

    /// Run the plan.
    ///
    /// Units run in declaration order after filtering. A failed critical
    /// unit stops the run; any other failure is recorded and the run
    /// continues.
    pub fn run(&mut self, quick: bool, observer: &mut dyn RunObserver) -> RunReport {
        self.state = RunState::Running;
        let started_at = Local::now();
        let started = Instant::now();

        if let Err(e) = self.selector.release() {
            warn!("Failed to reset multiplexer at run start: {}", e);
        }

        let (planned, skipped) = partition_plan(&self.config.tests, quick);
        let total = planned.len();
        info!(
            "Starting diagnostic run: {} units, {} excluded{}",
            total,
            skipped.len(),
            if quick { " (quick mode)" } else { "" }
        );
        observer.on_run_start(&self.config.shared.service_name, total, &skipped);

        let mut results = Vec::with_capacity(total);
        let mut termination = Termination::Completed;

        for (idx, unit_config) in planned.into_iter().enumerate() {
            let position = idx + 1;
            observer.on_unit_start(position, total, unit_config);

            let unit = TestUnit::bind(unit_config.clone(), &self.registry);
            let result = unit.run(self.selector.as_mut());
            observer.on_unit_finished(position, total, &result);

            let aborts = result.aborts_run();
            results.push(result);

            if aborts {
                error!(
                    "Critical unit '{}' failed, aborting after {}/{} units",
                    unit_config.name, position, total
                );
                termination = Termination::AbortedCritical {
                    unit: unit_config.name.clone(),
                    position,
                };
                if let Some(last) = results.last() {
                    observer.on_abort(last, total - position);
                }
                break;
            }
        }

        let status = RunReport::verdict(&results, &termination);
        self.state = match termination {
            Termination::Completed => RunState::Completed,
            Termination::AbortedCritical { .. } => RunState::AbortedCritical,
        };

        let report = RunReport {
            results,
            skipped,
            status,
            termination,
            started_at,
            elapsed: started.elapsed(),
        };
        info!(
            "Diagnostic run finished: {:?} ({} passed, {} failed, {} skipped) in {}ms",
            report.status,
            report.passed(),
            report.failed(),
            report.skipped_count(),
            report.elapsed.as_millis()
        );
        report
    }

    /// Run one unit by name, ignoring its enabled flag.
    pub fn run_unit(&mut self, name: &str) -> Option<TestResult> {
        let mut config = self.config.unit(name)?.clone();
        config.enabled = true;
        debug!("Running single unit '{}'", name);
        Some(run_test(self.selector.as_mut(), &self.registry, &config))
    }
}

/// Run one unit standalone against a multiplexer.
pub fn run_test(
    selector: &mut dyn ChannelSelector,
    registry: &ProbeRegistry,
    config: &DeviceConfig,
) -> TestResult {
    TestUnit::bind(config.clone(), registry).run(selector)
}

/// Open the hardware multiplexer named in the `[bus]` section.
///
/// # Errors
/// Returns `BusError::Io` if the adapter cannot be opened, or on platforms
/// without I2C character devices.
pub fn open_hardware_selector(bus: &BusConfig) -> Result<Box<dyn ChannelSelector>, BusError> {
    #[cfg(target_os = "linux")]
    {
        let adapter = crate::linux::LinuxI2cBus::from_config(bus)?;
        Ok(Box::new(Pca9548a::from_config(adapter, bus)))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(BusError::Io(format!(
            "{}: I2C character devices require Linux",
            bus.device.display()
        )))
    }
}

/// Multiplexer on a simulated bus populated from the plan.
pub fn simulated_selector(config: &DiagConfig) -> Box<dyn ChannelSelector> {
    Box::new(Pca9548a::from_config(
        SimulatedBus::from_config(config),
        &config.bus,
    ))
}

/// Run the default plan against the hardware and print the report.
///
/// With `verbose` off only the verdict line is printed. Returns the process
/// exit code: 0 if every executed unit passed, 1 otherwise (including
/// startup failures).
pub fn run_diagnostics(verbose: bool, quick: bool) -> i32 {
    let config = match DiagCore::load_config(Path::new(DEFAULT_CONFIG_PATH)) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load diagnostic plan: {}", e);
            return 1;
        }
    };

    let selector = match open_hardware_selector(&config.bus) {
        Ok(selector) => selector,
        Err(e) => {
            error!("Failed to open I2C bus: {}", e);
            return 1;
        }
    };

    run_diagnostics_with(config, selector, verbose, quick, io::stdout())
}

/// Run `config` on `selector` and write the report to `out`.
pub fn run_diagnostics_with<W: Write>(
    config: DiagConfig,
    selector: Box<dyn ChannelSelector>,
    verbose: bool,
    quick: bool,
    out: W,
) -> i32 {
    let mut core = match DiagCore::new(config, selector, ProbeRegistry::with_builtin()) {
        Ok(core) => core,
        Err(e) => {
            error!("Invalid diagnostic plan: {}", e);
            return 1;
        }
    };

    let mut reporter = Reporter::new(out, false, !verbose);
    let report = core.run(quick, &mut reporter);
    reporter.summary(&report);
    report.exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_filter() {
        let enabled = DeviceConfig::new("a", PROBE_SHT3X, 0, 0x44);
        let visual = DeviceConfig::new("b", PROBE_SH1106, 2, 0x3D).visual();
        let disabled_visual = visual.clone().disabled();

        assert_eq!(exclusion(&enabled, true), None);
        assert_eq!(exclusion(&visual, false), None);
        assert_eq!(exclusion(&visual, true), Some(SkipReason::QuickMode));
        assert_eq!(exclusion(&disabled_visual, true), Some(SkipReason::Disabled));
    }

    #[test]
    fn partition_keeps_order() {
        let units = vec![
            DeviceConfig::new("a", PROBE_SHT3X, 0, 0x44),
            DeviceConfig::new("b", PROBE_SH1106, 2, 0x3D).visual(),
            DeviceConfig::new("c", PROBE_BMX280, 1, 0x76).disabled(),
            DeviceConfig::new("d", PROBE_SH1106, 3, 0x3C),
        ];
        let (planned, skipped) = partition_plan(&units, true);
        let names: Vec<_> = planned.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["a", "d"]);
        assert_eq!(
            skipped,
            vec![
                SkippedUnit {
                    name: "b".to_string(),
                    reason: SkipReason::QuickMode
                },
                SkippedUnit {
                    name: "c".to_string(),
                    reason: SkipReason::Disabled
                },
            ]
        );
    }

    #[test]
    fn state_transitions() {
        let mut config = DiagConfig::reference_board();
        config.bus.settle_ms = 0;
        config.tests.retain(|t| t.probe == PROBE_MULTIPLEXER);
        let selector = simulated_selector(&config);

        let mut core = DiagCore::new(config, selector, ProbeRegistry::with_builtin()).unwrap();
        assert_eq!(core.state(), RunState::Idle);

        let report = core.run(false, &mut SilentObserver);
        assert_eq!(core.state(), RunState::Completed);
        assert_eq!(report.status, RunStatus::Pass);
    }

    #[test]
    fn invalid_plan_rejected() {
        let mut config = DiagConfig::reference_board();
        config.tests[1].name = config.tests[0].name.clone();
        let selector = simulated_selector(&config);
        assert!(DiagCore::new(config, selector, ProbeRegistry::with_builtin()).is_err());
    }

    fn unreachable_channel_plan() -> DiagConfig {
        let mut config = DiagConfig::reference_board();
        config.bus.settle_ms = 0;
        config.tests = vec![DeviceConfig::new("Ghost", PROBE_SHT3X, 9, 0x44)];
        config
    }

    #[test]
    fn non_verbose_run_prints_only_verdict() {
        let config = unreachable_channel_plan();
        let selector = simulated_selector(&config);
        let mut out = Vec::new();

        let code = run_diagnostics_with(config, selector, false, false, &mut out);

        assert_eq!(code, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "RESULT: FAIL, 1 of 1 tests failed\n"
        );
    }

    #[test]
    fn verbose_run_narrates_and_summarizes() {
        let config = unreachable_channel_plan();
        let selector = simulated_selector(&config);
        let mut out = Vec::new();

        let code = run_diagnostics_with(config, selector, true, false, &mut out);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(code, 1);
        assert!(text.contains("SUMMARY"));
        assert!(text.contains("Ghost"));
        assert!(text.ends_with("RESULT: FAIL, 1 of 1 tests failed\n"));
    }

    #[test]
    fn explicit_missing_path_is_error() {
        let result = DiagCore::load_config(Path::new("/nonexistent/diagnostics.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }
}
