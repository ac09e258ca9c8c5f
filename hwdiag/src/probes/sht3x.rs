//! Sensirion SHT3x temperature/humidity probe.
//!
//! Issues a single-shot high-repeatability measurement without clock
//! stretching, then polls for the 6-byte result frame. The sensor NACKs
//! reads while the conversion is in progress.

use super::check_range;
use super::device::Device;
use hwdiag_common::prelude::*;
use serde_json::json;
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

/// Single shot, high repeatability, clock stretching disabled.
pub const CMD_MEASURE_HIGH: [u8; 2] = [0x24, 0x00];

/// Typical high-repeatability conversion time.
const MEASURE_DELAY: Duration = Duration::from_millis(15);

/// Interval between result polls.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Default bound on the result poll (`timeout_ms` arg).
const DEFAULT_TIMEOUT_MS: u64 = 100;

/// SHT3x measurement check.
pub struct Sht3xProbe;

/// Factory registered under `sht3x`.
pub fn create_probe() -> Box<dyn DeviceProbe> {
    Box::new(Sht3xProbe)
}

/// CRC-8 over one data word (polynomial 0x31, init 0xFF).
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Temperature in °C from a raw word.
pub fn temperature_from_raw(raw: u16) -> f64 {
    -45.0 + 175.0 * f64::from(raw) / 65535.0
}

/// Relative humidity in % from a raw word.
pub fn humidity_from_raw(raw: u16) -> f64 {
    100.0 * f64::from(raw) / 65535.0
}

/// Validate one `[msb, lsb, crc]` triple.
fn checked_word(chunk: &[u8], what: &str) -> Result<u16, ProbeError> {
    let (word, crc) = (&chunk[..2], chunk[2]);
    let computed = crc8(word);
    if computed != crc {
        return Err(ProbeError::TransportError(format!(
            "{what} CRC mismatch (got 0x{crc:02X}, computed 0x{computed:02X})"
        )));
    }
    Ok(u16::from_be_bytes([word[0], word[1]]))
}

/// Poll until the sensor hands out its result frame.
fn poll_frame(device: &mut Device<'_>, timeout: Duration) -> Result<[u8; 6], ProbeError> {
    let deadline = Instant::now() + timeout;
    let mut frame = [0u8; 6];
    let mut polls = 0u32;

    loop {
        polls += 1;
        match device.try_read(&mut frame) {
            Ok(()) => {
                trace!("SHT3x@0x{:02X} ready after {} polls", device.address(), polls);
                return Ok(frame);
            }
            Err(err) if err.is_address_nack() => {
                if Instant::now() >= deadline {
                    return Err(ProbeError::Timeout(format!(
                        "no measurement after {}ms ({} polls)",
                        timeout.as_millis(),
                        polls
                    )));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => return Err(device.classify(err)),
        }
    }
}

impl DeviceProbe for Sht3xProbe {
    fn kind(&self) -> &'static str {
        PROBE_SHT3X
    }

    fn probe(
        &self,
        bus: &mut dyn DeviceBus,
        target: &ProbeTarget<'_>,
    ) -> Result<ProbeReport, ProbeError> {
        let timeout = Duration::from_millis(target.arg_u64("timeout_ms", DEFAULT_TIMEOUT_MS));
        let mut device = Device::new(bus, target.address);

        device.write(&CMD_MEASURE_HIGH)?;
        thread::sleep(MEASURE_DELAY);
        let frame = poll_frame(&mut device, timeout)?;

        let raw_t = checked_word(&frame[0..3], "temperature")?;
        let raw_h = checked_word(&frame[3..6], "humidity")?;

        let temperature = check_range(
            "temperature",
            temperature_from_raw(raw_t),
            TEMPERATURE_RANGE_C,
            "°C",
        )?;
        let humidity = check_range("humidity", humidity_from_raw(raw_h), HUMIDITY_RANGE_PCT, "%RH")?;

        Ok(
            ProbeReport::new(format!("SHT3x {temperature:.1} °C, {humidity:.1} %RH")).with_payload(
                json!({
                    "temperature_c": temperature,
                    "humidity_pct": humidity,
                }),
            ),
        )
    }
}
