//! Channel scan.
//!
//! Routes each multiplexer channel in turn and records which addresses
//! acknowledge an empty write, the same quick-write probe `i2cdetect` uses.

use crate::mux::{ChannelSelector, SelectError};
use hwdiag_common::prelude::*;
use tracing::{debug, warn};

/// One acknowledging address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanHit {
    /// 7-bit address
    pub address: u8,
    /// Likely device family
    pub hint: Option<&'static str>,
}

/// Scan result for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelScan {
    /// Multiplexer channel
    pub channel: u8,
    /// Acknowledging addresses, or why the channel could not be routed
    pub devices: Result<Vec<ScanHit>, SelectError>,
}

/// Likely device family for a well-known address.
pub fn device_hint(address: u8) -> Option<&'static str> {
    match address {
        0x3C | 0x3D => Some("SH1106/SSD1306 OLED"),
        0x44 | 0x45 => Some("SHT3x temperature/humidity"),
        0x76 | 0x77 => Some("BMP280/BME280 pressure"),
        0x70..=0x75 => Some("PCA9548A multiplexer"),
        _ => None,
    }
}

/// Scan every channel, skipping the multiplexer's own address.
///
/// The selector is released after each channel.
pub fn scan_channels(selector: &mut dyn ChannelSelector, mux_address: u8) -> Vec<ChannelScan> {
    (0..MUX_CHANNELS)
        .map(|channel| {
            let devices = scan_channel(selector, channel, mux_address);
            if let Err(e) = selector.release() {
                warn!("Failed to release multiplexer after scanning channel {}: {}", channel, e);
            }
            ChannelScan { channel, devices }
        })
        .collect()
}

fn scan_channel(
    selector: &mut dyn ChannelSelector,
    channel: u8,
    mux_address: u8,
) -> Result<Vec<ScanHit>, SelectError> {
    let bus = selector.select(channel)?;
    let hits: Vec<ScanHit> = SCAN_ADDRESSES
        .filter(|&address| address != mux_address)
        .filter(|&address| bus.write(address, &[]).is_ok())
        .map(|address| ScanHit {
            address,
            hint: device_hint(address),
        })
        .collect();
    debug!("Channel {}: {} devices", channel, hits.len());
    Ok(hits)
}
