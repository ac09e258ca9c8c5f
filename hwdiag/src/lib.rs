//! # hwdiag Library
//!
//! I2C peripheral self-test harness for devices behind a PCA9548A
//! multiplexer, with pluggable device probes.
//!
//! Probes implement the `DeviceProbe` trait defined in
//! `hwdiag_common::device::probe`.
//!
//! # Module Structure
//!
//! - [`core`] - DiagCore struct, run state machine, programmatic entry points
//! - [`mux`] - Channel selector trait and PCA9548A implementation
//! - [`probe_registry`] - Probe factory registration
//! - [`probes`] - Built-in device probes
//! - [`unit`] - Test unit binding a configured device to its probe
//! - [`report`] - Console narration, summary and JSON report
//! - [`scan`] - Per-channel address scan
//! - [`sim`] - Simulated bus for running without hardware
//! - `linux` - `/dev/i2c-N` transport (Linux only)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         hwdiag (single crate)                    │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │ DiagConfig  │───►│  DiagCore    │◄──►│  Probe Registry     │  │
//! │  │(hwdiag_common)   │ (run loop)   │    │                     │  │
//! │  └─────────────┘    └──────┬───────┘    └─────────────────────┘  │
//! │                            │ select / release                    │
//! │                            ▼                                     │
//! │                   ┌────────────────┐    ┌─────────────────────┐  │
//! │                   │ ChannelSelector│───►│  DeviceProbe        │  │
//! │                   │ (PCA9548A)     │bus │  (trait object)     │  │
//! │                   └────────────────┘    └─────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod core;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod mux;
pub mod probe_registry;
pub mod probes;
pub mod report;
pub mod scan;
pub mod sim;
pub mod unit;

// Re-export key types for convenience
pub use crate::core::{
    DiagCore, RunObserver, RunState, run_diagnostics, run_diagnostics_with, run_test,
};
pub use crate::mux::{ChannelSelector, Pca9548a, SelectError};
pub use crate::probe_registry::ProbeRegistry;
pub use crate::report::Reporter;
pub use crate::unit::TestUnit;
