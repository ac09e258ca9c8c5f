//! Channel selector for the PCA9548A bus multiplexer.
//!
//! The multiplexer is the one stateful resource every probe shares. The
//! [`ChannelSelector`] trait hands out the downstream bus as a mutable borrow
//! of the selector, so a probe holding the bus keeps every other caller away
//! from the multiplexer until it returns.

use hwdiag_common::prelude::*;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Error types for channel selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    /// Channel outside 0..=7, nothing written
    #[error("invalid multiplexer channel {channel}")]
    InvalidChannel {
        /// Requested channel
        channel: u8,
    },

    /// Control register write failed
    #[error("multiplexer transfer failed: {0}")]
    Transport(#[from] BusError),
}

impl From<SelectError> for ProbeError {
    fn from(err: SelectError) -> Self {
        match err {
            SelectError::InvalidChannel { channel } => ProbeError::InvalidChannel { channel },
            SelectError::Transport(e) => {
                ProbeError::TransportError(format!("multiplexer did not accept select: {e}"))
            }
        }
    }
}

/// Exclusive access to one downstream channel at a time.
///
/// # Contract
///
/// - `select` replaces the active set with exactly one channel, never adds
/// - the returned bus is only valid until the next call on the selector
/// - `release` disables every channel
pub trait ChannelSelector {
    /// Route the downstream bus to `channel` and hand it out.
    fn select(&mut self, channel: u8) -> Result<&mut dyn DeviceBus, SelectError>;

    /// Disconnect every downstream channel.
    fn release(&mut self) -> Result<(), SelectError>;

    /// Channel routed by the last successful select, if any.
    fn active_channel(&self) -> Option<u8>;
}

/// PCA9548A 8-channel multiplexer on any [`DeviceBus`].
pub struct Pca9548a<B> {
    /// Root bus
    bus: B,
    /// Multiplexer address on the root bus
    address: u8,
    /// Wait after a channel switch
    settle: Duration,
    /// Channel routed by the last successful select
    active: Option<u8>,
}

impl<B: DeviceBus> Pca9548a<B> {
    /// Create a selector with the default settle time.
    pub fn new(bus: B, address: u8) -> Self {
        Self {
            bus,
            address,
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            active: None,
        }
    }

    /// Create a selector from the `[bus]` section.
    pub fn from_config(bus: B, config: &BusConfig) -> Self {
        Self::new(bus, config.mux_address).with_settle(config.settle())
    }

    /// Override the settle time.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Multiplexer address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Borrow the root bus.
    pub fn inner(&self) -> &B {
        &self.bus
    }

    /// Give back the root bus.
    pub fn into_inner(self) -> B {
        self.bus
    }

    fn write_control(&mut self, mask: ChannelMask) -> Result<(), SelectError> {
        trace!(
            "PCA9548A@0x{:02X} control <- 0x{:02X}",
            self.address,
            mask.bits()
        );
        self.bus.write(self.address, &[mask.bits()])?;
        Ok(())
    }
}

impl<B: DeviceBus> ChannelSelector for Pca9548a<B> {
    fn select(&mut self, channel: u8) -> Result<&mut dyn DeviceBus, SelectError> {
        let mask = ChannelMask::single(channel).ok_or(SelectError::InvalidChannel { channel })?;

        self.active = None;
        self.write_control(mask)?;
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        self.active = Some(channel);
        debug!("Selected multiplexer channel {}", channel);

        Ok(&mut self.bus)
    }

    fn release(&mut self) -> Result<(), SelectError> {
        self.active = None;
        self.write_control(ChannelMask::empty())
    }

    fn active_channel(&self) -> Option<u8> {
        self.active
    }
}
