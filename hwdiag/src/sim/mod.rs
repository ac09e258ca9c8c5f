//! Simulated bus.
//!
//! This module provides a software PCA9548A with virtual peripherals behind
//! it, for running the harness without hardware (`--simulate`) and for the
//! test suite.

mod bus;
mod devices;

pub use bus::{BusEvent, BusOp, SimulatedBus, TransactionLog};
pub use devices::{SimBmx280, SimDevice, SimSh1106, SimSht3x};
