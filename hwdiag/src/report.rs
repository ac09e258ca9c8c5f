//! Run reporting.
//!
//! The `Reporter` narrates a run as it happens (it is a [`RunObserver`]),
//! prints the summary and verdict, lists the plan and scan results, and
//! writes the machine-readable JSON report.

use crate::core::{RunObserver, exclusion};
use crate::scan::ChannelScan;
use hwdiag_common::prelude::*;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info};

const RULE: &str = "============================================================";

/// Human-readable report writer.
pub struct Reporter<W: Write> {
    /// Output sink
    out: W,
    /// Print probe payloads
    verbose: bool,
    /// Only print the final verdict
    quiet: bool,
}

impl Reporter<io::Stdout> {
    /// Reporter on standard output.
    pub fn stdout(verbose: bool, quiet: bool) -> Self {
        Self::new(io::stdout(), verbose, quiet)
    }
}

impl<W: Write> Reporter<W> {
    /// Reporter on any sink.
    pub fn new(out: W, verbose: bool, quiet: bool) -> Self {
        Self {
            out,
            verbose,
            quiet,
        }
    }

    /// Give back the sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.out, "{line}") {
            debug!("Report output failed: {}", e);
        }
    }

    fn narrate(&mut self, line: fmt::Arguments<'_>) {
        if !self.quiet {
            self.emit(line);
        }
    }

    /// Print counts, per-unit details and the verdict.
    pub fn summary(&mut self, report: &RunReport) {
        if !self.quiet {
            self.emit(format_args!(""));
            self.emit(format_args!("{RULE}"));
            self.emit(format_args!("SUMMARY"));
            self.emit(format_args!("{RULE}"));
            self.emit(format_args!("Tests run: {}", report.results.len()));
            self.emit(format_args!("Passed:    {}", report.passed()));
            self.emit(format_args!("Failed:    {}", report.failed()));
            self.emit(format_args!("Skipped:   {}", report.skipped_count()));
            self.emit(format_args!(
                "Duration:  {:.2}s",
                report.elapsed.as_secs_f64()
            ));

            if let Termination::AbortedCritical { unit, position } = &report.termination {
                self.emit(format_args!(
                    "Aborted at critical unit '{unit}' (test {position})"
                ));
            }

            self.emit(format_args!(""));
            self.emit(format_args!("Details:"));
            for result in &report.results {
                let mark = status_mark(result.status());
                self.emit(format_args!("  {mark} {}: {}", result.name(), result.outcome.message));
                if let Some(error) = &result.outcome.error {
                    self.emit(format_args!("      {error}"));
                }
            }
            for skipped in &report.skipped {
                self.emit(format_args!(
                    "  - {}: {}",
                    skipped.name,
                    skip_text(skipped.reason)
                ));
            }
            self.emit(format_args!(""));
        }

        match report.status {
            RunStatus::Pass => self.emit(format_args!("RESULT: PASS, all hardware tests passed")),
            RunStatus::Fail => self.emit(format_args!(
                "RESULT: FAIL, {} of {} tests failed",
                report.failed(),
                report.results.len()
            )),
        }
    }

    /// Print a single standalone unit result.
    pub fn unit_result(&mut self, result: &TestResult) {
        self.on_unit_finished(1, 1, result);
        let verdict = if result.counts_toward_failure() {
            "FAIL"
        } else {
            "PASS"
        };
        self.emit(format_args!("RESULT: {verdict}"));
    }

    /// Print the plan.
    pub fn list(&mut self, config: &DiagConfig) {
        self.emit(format_args!("Available tests:"));
        self.emit(format_args!("{RULE}"));
        for (idx, unit) in config.tests.iter().enumerate() {
            let mut markers = String::new();
            if unit.critical {
                markers.push_str(" [CRITICAL]");
            }
            if unit.visual {
                markers.push_str(" [VISUAL]");
            }
            self.emit(format_args!("{}. {}{}", idx + 1, unit.name, markers));
            self.emit(format_args!(
                "   probe: {}, channel {}, address 0x{:02X}",
                unit.probe, unit.channel, unit.address
            ));
            let state = if unit.enabled { "ENABLED" } else { "DISABLED" };
            match exclusion(unit, true) {
                Some(SkipReason::QuickMode) => {
                    self.emit(format_args!("   status: {state} (skipped by --quick)"))
                }
                _ => self.emit(format_args!("   status: {state}")),
            }
        }
    }

    /// Print scan results.
    pub fn scan(&mut self, scans: &[ChannelScan]) {
        self.emit(format_args!("Multiplexer channel scan:"));
        self.emit(format_args!("{RULE}"));
        for scan in scans {
            match &scan.devices {
                Err(e) => self.emit(format_args!("Channel {}: select failed: {e}", scan.channel)),
                Ok(devices) if devices.is_empty() => {
                    self.emit(format_args!("Channel {}: no devices", scan.channel))
                }
                Ok(devices) => {
                    self.emit(format_args!("Channel {}:", scan.channel));
                    for hit in devices {
                        match hit.hint {
                            Some(hint) => {
                                self.emit(format_args!("  0x{:02X}  {hint}", hit.address))
                            }
                            None => self.emit(format_args!("  0x{:02X}", hit.address)),
                        }
                    }
                }
            }
        }
    }
}

impl<W: Write> RunObserver for Reporter<W> {
    fn on_run_start(&mut self, service: &str, planned: usize, excluded: &[SkippedUnit]) {
        self.narrate(format_args!("{RULE}"));
        self.narrate(format_args!("{service}: I2C hardware self-test"));
        self.narrate(format_args!(
            "Started: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        self.narrate(format_args!("{RULE}"));
        for skipped in excluded {
            self.narrate(format_args!(
                "Skipping {} ({})",
                skipped.name,
                skip_text(skipped.reason)
            ));
        }
        self.narrate(format_args!("Running {planned} tests"));
    }

    fn on_unit_start(&mut self, position: usize, total: usize, unit: &DeviceConfig) {
        self.narrate(format_args!(""));
        self.narrate(format_args!("[{position}/{total}] {}", unit.name));
    }

    fn on_unit_finished(&mut self, _position: usize, _total: usize, result: &TestResult) {
        let mark = status_mark(result.status());
        self.narrate(format_args!(
            "  {mark} {}: {} ({}ms)",
            status_word(result.status()),
            result.outcome.message,
            result.elapsed.as_millis()
        ));
        if let Some(error) = &result.outcome.error {
            self.narrate(format_args!("    Error: {error}"));
        }
        if self.verbose {
            if let Some(payload) = &result.outcome.payload {
                self.narrate(format_args!("    Data: {payload}"));
            }
        }
    }

    fn on_abort(&mut self, result: &TestResult, remaining: usize) {
        self.narrate(format_args!(""));
        self.narrate(format_args!(
            "!! Critical test '{}' failed, {remaining} remaining tests not run",
            result.name()
        ));
    }
}

/// Write the report as pretty JSON.
pub fn write_json(report: &RunReport, path: &Path) -> io::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)?;
    info!("Report written to {:?}", path);
    Ok(())
}

fn status_mark(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Pass => "✓",
        TestStatus::Fail => "✗",
        TestStatus::Skipped => "-",
    }
}

fn status_word(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Pass => "PASS",
        TestStatus::Fail => "FAIL",
        TestStatus::Skipped => "SKIP",
    }
}

fn skip_text(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::Disabled => "disabled",
        SkipReason::QuickMode => "quick mode",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use std::time::Duration;

    fn result(name: &str, critical: bool, outcome: ProbeOutcome) -> TestResult {
        let mut config = DeviceConfig::new(name, PROBE_SHT3X, 0, 0x44);
        config.critical = critical;
        TestResult::new(config, outcome, Duration::from_millis(12))
    }

    fn report(results: Vec<TestResult>, termination: Termination) -> RunReport {
        RunReport {
            status: RunReport::verdict(&results, &termination),
            results,
            skipped: vec![SkippedUnit {
                name: "OLED 2".to_string(),
                reason: SkipReason::QuickMode,
            }],
            termination,
            started_at: Local::now(),
            elapsed: Duration::from_millis(250),
        }
    }

    fn render(f: impl FnOnce(&mut Reporter<Vec<u8>>)) -> String {
        let mut reporter = Reporter::new(Vec::new(), false, false);
        f(&mut reporter);
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn summary_lists_counts_and_verdict() {
        let report = report(
            vec![
                result("SHT31", false, ProbeOutcome::passed(ProbeReport::new("SHT3x 22.5 °C"))),
                result(
                    "BMP280",
                    false,
                    ProbeOutcome::failed(ProbeError::NotPresent { address: 0x76 }),
                ),
            ],
            Termination::Completed,
        );
        let text = render(|r| r.summary(&report));

        assert!(text.contains("Tests run: 2"));
        assert!(text.contains("Passed:    1"));
        assert!(text.contains("Failed:    1"));
        assert!(text.contains("Skipped:   1"));
        assert!(text.contains("✗ BMP280: Device not responding"));
        assert!(text.contains("no device acknowledged at 0x76"));
        assert!(text.contains("- OLED 2: quick mode"));
        assert!(text.ends_with("RESULT: FAIL, 1 of 2 tests failed\n"));
    }

    #[test]
    fn summary_reports_abort() {
        let report = report(
            vec![result(
                "Mux",
                true,
                ProbeOutcome::failed(ProbeError::NotPresent { address: 0x70 }),
            )],
            Termination::AbortedCritical {
                unit: "Mux".to_string(),
                position: 1,
            },
        );
        let text = render(|r| r.summary(&report));
        assert!(text.contains("Aborted at critical unit 'Mux'"));
    }

    #[test]
    fn quiet_prints_verdict_only() {
        let report = report(
            vec![result("SHT31", false, ProbeOutcome::passed(ProbeReport::new("ok")))],
            Termination::Completed,
        );
        let mut reporter = Reporter::new(Vec::new(), false, true);
        reporter.on_run_start("hwdiag", 1, &[]);
        reporter.on_unit_finished(1, 1, &report.results[0]);
        reporter.summary(&report);
        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(text, "RESULT: PASS, all hardware tests passed\n");
    }

    #[test]
    fn narration_shows_progress_and_payload() {
        let outcome = ProbeOutcome::passed(
            ProbeReport::new("SHT3x 22.5 °C").with_payload(serde_json::json!({"temperature_c": 22.5})),
        );
        let r = result("SHT31", false, outcome);

        let mut reporter = Reporter::new(Vec::new(), true, false);
        reporter.on_unit_start(2, 5, &r.config);
        reporter.on_unit_finished(2, 5, &r);
        let text = String::from_utf8(reporter.into_inner()).unwrap();

        assert!(text.contains("[2/5] SHT31"));
        assert!(text.contains("✓ PASS: SHT3x 22.5 °C (12ms)"));
        assert!(text.contains("Data: {\"temperature_c\":22.5}"));
    }

    #[test]
    fn list_marks_critical_and_visual() {
        let mut config = DiagConfig::reference_board();
        config.tests[3] = config.tests[3].clone().visual();
        config.tests[4] = config.tests[4].clone().disabled();
        let text = render(|r| r.list(&config));

        assert!(text.contains("1. I2C Multiplexer [CRITICAL]"));
        assert!(text.contains("4. OLED 1 [VISUAL]"));
        assert!(text.contains("status: ENABLED (skipped by --quick)"));
        assert!(text.contains("status: DISABLED"));
        assert!(text.contains("channel 1, address 0x76"));
    }

    #[test]
    fn json_report_written() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let report = report(
            vec![result("SHT31", false, ProbeOutcome::passed(ProbeReport::new("ok")))],
            Termination::Completed,
        );

        write_json(&report, &path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["status"], "pass");
        assert_eq!(value["termination"]["state"], "completed");
        assert_eq!(value["results"][0]["config"]["name"], "SHT31");
        assert_eq!(value["skipped"][0]["reason"], "quick_mode");
    }
}
