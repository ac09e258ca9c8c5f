//! Prelude module for common re-exports.
//!
//! Consumers can `use hwdiag_common::prelude::*;` and get the most important
//! types without listing individual paths.

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};
pub use crate::device::config::{BusConfig, DeviceConfig, DiagConfig, ProbeArgs};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::device::consts::*;

// ─── Bus ────────────────────────────────────────────────────────────
pub use crate::device::bus::{AckStage, BusError, DeviceBus};
pub use crate::device::channel::ChannelMask;

// ─── Probes ─────────────────────────────────────────────────────────
pub use crate::device::probe::{
    DeviceProbe, FailureKind, ProbeError, ProbeFactory, ProbeReport, ProbeTarget,
};

// ─── Results ────────────────────────────────────────────────────────
pub use crate::device::types::{
    ProbeOutcome, RunReport, RunStatus, SkipReason, SkippedUnit, Termination, TestResult,
    TestStatus,
};
