//! Device probe trait and error types.
//!
//! This module defines:
//! - `DeviceProbe` trait - Interface for pluggable device checks
//! - `ProbeError` enum - Failure taxonomy of a probe attempt
//! - `ProbeTarget` struct - What the probe is pointed at
//! - `ProbeReport` struct - Successful probe result
//! - `ProbeFactory` type alias - Factory function type

use crate::device::bus::{BusError, DeviceBus};
use crate::device::config::{DeviceConfig, ProbeArgs, arg_u64};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure classes reported by probes and the channel selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Channel outside 0..=7
    InvalidChannel,
    /// I/O error or corrupted data mid-transaction
    TransportError,
    /// No acknowledgment at first contact
    NotPresent,
    /// Bounded wait elapsed
    Timeout,
    /// Data outside the physical range
    ImplausibleReading,
    /// Probe defect (panic, missing implementation)
    UnexpectedFault,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureKind::InvalidChannel => "invalid channel",
            FailureKind::TransportError => "transport error",
            FailureKind::NotPresent => "not present",
            FailureKind::Timeout => "timeout",
            FailureKind::ImplausibleReading => "implausible reading",
            FailureKind::UnexpectedFault => "unexpected fault",
        };
        f.write_str(text)
    }
}

/// Error types for a probe attempt.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum ProbeError {
    /// Channel outside the multiplexer range
    #[error("invalid multiplexer channel {channel}")]
    InvalidChannel {
        /// Requested channel
        channel: u8,
    },

    /// Transfer failed after contact, or returned corrupted data
    #[error("transport error: {0}")]
    TransportError(String),

    /// Nothing acknowledged the address
    #[error("no device acknowledged at 0x{address:02X}")]
    NotPresent {
        /// Probed address
        address: u8,
    },

    /// Bounded wait elapsed
    #[error("timeout: {0}")]
    Timeout(String),

    /// Device answered with physically impossible data
    #[error("implausible reading: {0}")]
    ImplausibleReading(String),

    /// Probe defect
    #[error("unexpected fault: {0}")]
    UnexpectedFault(String),
}

impl ProbeError {
    /// Failure class of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            ProbeError::InvalidChannel { .. } => FailureKind::InvalidChannel,
            ProbeError::TransportError(_) => FailureKind::TransportError,
            ProbeError::NotPresent { .. } => FailureKind::NotPresent,
            ProbeError::Timeout(_) => FailureKind::Timeout,
            ProbeError::ImplausibleReading(_) => FailureKind::ImplausibleReading,
            ProbeError::UnexpectedFault(_) => FailureKind::UnexpectedFault,
        }
    }

    /// Classify a bus error.
    ///
    /// An address NACK before the device ever answered means the device is
    /// absent; after contact the same NACK is a transport failure.
    pub fn from_bus(err: BusError, address: u8, contacted: bool) -> Self {
        match err {
            e if e.is_address_nack() && !contacted => ProbeError::NotPresent { address },
            BusError::Timeout => {
                ProbeError::Timeout(format!("transfer to 0x{address:02X} timed out"))
            }
            e => ProbeError::TransportError(format!("0x{address:02X}: {e}")),
        }
    }
}

/// What a probe is pointed at.
#[derive(Debug, Clone, Copy)]
pub struct ProbeTarget<'a> {
    /// Channel already selected by the caller (informational)
    pub channel: u8,
    /// Device address
    pub address: u8,
    /// Unit is visual/slow: run the full human-checked variant
    pub visual: bool,
    /// Probe-specific arguments
    pub args: &'a ProbeArgs,
}

impl<'a> ProbeTarget<'a> {
    /// Target for a configured unit.
    pub fn for_unit(config: &'a DeviceConfig) -> Self {
        Self {
            channel: config.channel,
            address: config.address,
            visual: config.visual,
            args: &config.args,
        }
    }

    /// Integer argument with default.
    pub fn arg_u64(&self, key: &str, default: u64) -> u64 {
        arg_u64(self.args, key, default)
    }
}

/// Successful probe result.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    /// Human-readable summary ("SHT3x 22.4 °C, 41.0 %RH")
    pub message: String,
    /// Measured values or device state
    pub payload: Option<serde_json::Value>,
}

impl ProbeReport {
    /// Report with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: None,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Factory function type for creating probe instances.
pub type ProbeFactory = fn() -> Box<dyn DeviceProbe>;

/// Trait defining the interface for device probes.
///
/// The diagnostic core selects the unit's channel and hands the probe the
/// bus borrowed from that selection. A probe must never switch channels
/// itself.
///
/// # Contract
///
/// - Return `ProbeError::NotPresent` when the first transfer is not
///   acknowledged
/// - Return `ProbeError::ImplausibleReading` for data outside the physical
///   range, never for communication failures
/// - Bound every wait; there is no external cancellation
pub trait DeviceProbe: Send {
    /// Probe kind this implementation serves (e.g. "sht3x").
    fn kind(&self) -> &'static str;

    /// Run the check against the device at `target.address`.
    fn probe(
        &self,
        bus: &mut dyn DeviceBus,
        target: &ProbeTarget<'_>,
    ) -> Result<ProbeReport, ProbeError>;
}
