//! hwdiag Common Library
//!
//! This crate provides the shared vocabulary of the diagnostic harness:
//! configuration loading, the bus seam, the device probe contract and the
//! result records.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and types
//! - [`device`] - Bus seam, probe contract, plan configuration, result records
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use hwdiag_common::prelude::*;
//!
//! let plan = DiagConfig::reference_board();
//! assert!(plan.validate().is_ok());
//! ```

pub mod config;
pub mod device;
pub mod prelude;
