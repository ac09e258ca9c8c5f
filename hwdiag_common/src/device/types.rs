//! Result records.
//!
//! This module defines the data produced by a run:
//! - `ProbeOutcome` - Normalized outcome of one probe attempt
//! - `TestResult` - One executed unit
//! - `RunReport` - Aggregate of a whole run

use crate::device::config::DeviceConfig;
use crate::device::probe::{FailureKind, ProbeError, ProbeReport};
use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};
use std::time::Duration;

fn serialize_ms<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_nanos() as f64 / 1_000_000.0)
}

/// Status of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Device present and plausible
    Pass,
    /// Any failure class
    Fail,
    /// Not executed
    Skipped,
}

/// Normalized outcome of a probe attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    /// Pass, fail or skipped
    pub status: TestStatus,
    /// Human-readable summary
    pub message: String,
    /// Failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProbeError>,
    /// Device-specific values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ProbeOutcome {
    /// Passing outcome from a probe report.
    pub fn passed(report: ProbeReport) -> Self {
        Self {
            status: TestStatus::Pass,
            message: report.message,
            error: None,
            payload: report.payload,
        }
    }

    /// Failing outcome; the message is the failure class.
    pub fn failed(error: ProbeError) -> Self {
        let message = match error.kind() {
            FailureKind::InvalidChannel => "Channel select rejected".to_string(),
            FailureKind::TransportError => "Communication error".to_string(),
            FailureKind::NotPresent => "Device not responding".to_string(),
            FailureKind::Timeout => "Device did not complete in time".to_string(),
            FailureKind::ImplausibleReading => "Reading out of physical range".to_string(),
            FailureKind::UnexpectedFault => "Unexpected fault in probe".to_string(),
        };
        Self {
            status: TestStatus::Fail,
            message,
            error: Some(error),
            payload: None,
        }
    }

    /// Skipped outcome.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: TestStatus::Skipped,
            message: reason.into(),
            error: None,
            payload: None,
        }
    }

    /// Convert a probe result.
    pub fn from_result(result: Result<ProbeReport, ProbeError>) -> Self {
        match result {
            Ok(report) => Self::passed(report),
            Err(error) => Self::failed(error),
        }
    }

    /// Failure class, if failed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(ProbeError::kind)
    }
}

/// One executed unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    /// Unit configuration that was executed
    pub config: DeviceConfig,
    /// Probe outcome
    pub outcome: ProbeOutcome,
    /// Wall time including channel select and release
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_ms")]
    pub elapsed: Duration,
}

impl TestResult {
    /// Build a record.
    pub fn new(config: DeviceConfig, outcome: ProbeOutcome, elapsed: Duration) -> Self {
        Self {
            config,
            outcome,
            elapsed,
        }
    }

    /// Unit name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Outcome status.
    pub fn status(&self) -> TestStatus {
        self.outcome.status
    }

    /// Any failed unit fails the run, critical or not.
    pub fn counts_toward_failure(&self) -> bool {
        self.outcome.status == TestStatus::Fail
    }

    /// A failed critical unit stops the run.
    pub fn aborts_run(&self) -> bool {
        self.config.critical && self.counts_toward_failure()
    }
}

/// Aggregate verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every executed unit passed
    Pass,
    /// At least one unit failed, or the run aborted
    Fail,
}

impl RunStatus {
    /// Process exit code: 0 pass, 1 fail.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Pass => 0,
            RunStatus::Fail => 1,
        }
    }
}

/// How the run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Termination {
    /// Every planned unit executed
    Completed,
    /// A critical unit failed
    AbortedCritical {
        /// Name of the failed critical unit
        unit: String,
        /// Position of that unit in the executed order (1-based)
        position: usize,
    },
}

/// Why a unit was left out of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// `enabled = false`
    Disabled,
    /// Visual/slow unit excluded by quick mode
    QuickMode,
}

/// Unit left out of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedUnit {
    /// Unit name
    pub name: String,
    /// Exclusion reason
    pub reason: SkipReason,
}

/// Aggregate of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Executed units in execution order
    pub results: Vec<TestResult>,
    /// Units excluded before iteration
    pub skipped: Vec<SkippedUnit>,
    /// Overall verdict
    pub status: RunStatus,
    /// Completed or aborted
    pub termination: Termination,
    /// Wall clock at run start
    pub started_at: DateTime<Local>,
    /// Total wall time
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_ms")]
    pub elapsed: Duration,
}

impl RunReport {
    /// Aggregate verdict for a set of results.
    ///
    /// Fail if aborted or if any result failed; skipped records never count.
    pub fn verdict(results: &[TestResult], termination: &Termination) -> RunStatus {
        let aborted = matches!(termination, Termination::AbortedCritical { .. });
        if aborted || results.iter().any(TestResult::counts_toward_failure) {
            RunStatus::Fail
        } else {
            RunStatus::Pass
        }
    }

    /// Number of passed units.
    pub fn passed(&self) -> usize {
        self.count(TestStatus::Pass)
    }

    /// Number of failed units.
    pub fn failed(&self) -> usize {
        self.count(TestStatus::Fail)
    }

    /// Number of units not executed (skipped records plus excluded units).
    pub fn skipped_count(&self) -> usize {
        self.count(TestStatus::Skipped) + self.skipped.len()
    }

    fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status() == status).count()
    }

    /// Process exit code.
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    /// Returns true if a critical unit aborted the run.
    pub fn aborted(&self) -> bool {
        matches!(self.termination, Termination::AbortedCritical { .. })
    }

    /// Result for a unit name.
    pub fn result(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::consts::PROBE_SHT3X;

    fn result(name: &str, critical: bool, outcome: ProbeOutcome) -> TestResult {
        let mut config = DeviceConfig::new(name, PROBE_SHT3X, 0, 0x44);
        config.critical = critical;
        TestResult::new(config, outcome, Duration::from_millis(3))
    }

    #[test]
    fn failed_outcome_carries_kind() {
        let outcome = ProbeOutcome::failed(ProbeError::NotPresent { address: 0x44 });
        assert_eq!(outcome.status, TestStatus::Fail);
        assert_eq!(outcome.failure_kind(), Some(FailureKind::NotPresent));
        assert_eq!(outcome.message, "Device not responding");
    }

    #[test]
    fn verdict_fails_on_non_critical_failure() {
        let results = vec![
            result("a", false, ProbeOutcome::passed(ProbeReport::new("ok"))),
            result(
                "b",
                false,
                ProbeOutcome::failed(ProbeError::Timeout("poll".to_string())),
            ),
        ];
        assert!(!results[1].aborts_run());
        assert_eq!(
            RunReport::verdict(&results, &Termination::Completed),
            RunStatus::Fail
        );
    }

    #[test]
    fn verdict_ignores_skipped() {
        let results = vec![
            result("a", false, ProbeOutcome::passed(ProbeReport::new("ok"))),
            result("b", true, ProbeOutcome::skipped("disabled")),
        ];
        assert!(!results[1].counts_toward_failure());
        assert_eq!(
            RunReport::verdict(&results, &Termination::Completed),
            RunStatus::Pass
        );
    }

    #[test]
    fn critical_failure_aborts() {
        let r = result(
            "mux",
            true,
            ProbeOutcome::failed(ProbeError::NotPresent { address: 0x70 }),
        );
        assert!(r.aborts_run());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(RunStatus::Pass.exit_code(), 0);
        assert_eq!(RunStatus::Fail.exit_code(), 1);
    }

    #[test]
    fn result_serializes_elapsed_ms() {
        let r = result("a", false, ProbeOutcome::passed(ProbeReport::new("ok")));
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["elapsed_ms"], 3.0);
        assert_eq!(json["outcome"]["status"], "pass");
        assert!(json["outcome"].get("error").is_none());
    }
}
