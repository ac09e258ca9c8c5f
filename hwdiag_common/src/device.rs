//! Device-level types for the diagnostic harness.
//!
//! This module contains the bus seam, the probe contract, the plan
//! configuration and the result records shared by the core and the probes.

pub mod bus;
pub mod channel;
pub mod config;
pub mod consts;
pub mod probe;
pub mod types;
