//! SH1106/SH1107 OLED probe.
//!
//! Every unit reads the controller status byte and writes a NOP command.
//! Visual units additionally initialize the panel, draw a border and
//! checkerboard for an operator to inspect, and clear it again.

use super::device::Device;
use hwdiag_common::prelude::*;
use serde_json::json;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Control byte: command stream follows.
const CONTROL_COMMAND: u8 = 0x00;
/// Control byte: display data stream follows.
const CONTROL_DATA: u8 = 0x40;
/// No-operation command.
const CMD_NOP: u8 = 0xE3;

const DEFAULT_WIDTH: u64 = 128;
const DEFAULT_HEIGHT: u64 = 64;
const DEFAULT_COLUMN_OFFSET: u64 = 2;
const DEFAULT_HOLD_MS: u64 = 500;

/// Columns addressable by the controller RAM.
const MAX_COLUMNS: u64 = 132;
/// Rows addressable by the controller RAM.
const MAX_ROWS: u64 = 128;

/// Panel geometry from the unit arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    width: usize,
    height: usize,
    column_offset: u8,
}

impl Geometry {
    fn from_target(target: &ProbeTarget<'_>) -> Result<Self, ProbeError> {
        let width = target.arg_u64("width", DEFAULT_WIDTH);
        let height = target.arg_u64("height", DEFAULT_HEIGHT);
        let column_offset = target.arg_u64("column_offset", DEFAULT_COLUMN_OFFSET);

        if width == 0 || height == 0 || height % 8 != 0 || height > MAX_ROWS {
            return Err(ProbeError::UnexpectedFault(format!(
                "unsupported panel geometry {width}x{height}"
            )));
        }
        if width + column_offset > MAX_COLUMNS {
            return Err(ProbeError::UnexpectedFault(format!(
                "panel width {width} at column offset {column_offset} exceeds controller RAM"
            )));
        }

        Ok(Self {
            width: width as usize,
            height: height as usize,
            column_offset: column_offset as u8,
        })
    }

    fn pages(&self) -> usize {
        self.height / 8
    }
}

/// Power-on sequence for the panel.
fn init_sequence(height: usize) -> Vec<u8> {
    let multiplex = (height - 1) as u8;
    vec![
        CONTROL_COMMAND,
        0xAE, // display off
        0xD5,
        0x80, // clock divide
        0xA8,
        multiplex, // multiplex ratio
        0xD3,
        0x00, // display offset
        0x40, // start line 0
        0xAD,
        0x8B, // DC-DC on
        0xA1, // segment remap
        0xC8, // COM scan descending
        0xDA,
        0x12, // COM pins
        0x81,
        0x80, // contrast
        0xD9,
        0x22, // precharge
        0xDB,
        0x35, // VCOMH
        0xA4, // resume from RAM
        0xA6, // normal, not inverted
        0xAF, // display on
    ]
}

/// Border plus 8x8 checkerboard, page-major (one byte = 8 vertical pixels).
pub fn test_pattern(width: usize, height: usize) -> Vec<u8> {
    let pages = height / 8;
    let mut frame = vec![0u8; width * pages];

    for page in 0..pages {
        for x in 0..width {
            let mut byte = 0u8;
            for bit in 0..8 {
                let y = page * 8 + bit;
                let border = x == 0 || y == 0 || x == width - 1 || y == height - 1;
                let checker = (x / 8 + y / 8) % 2 == 0;
                if border || checker {
                    byte |= 1 << bit;
                }
            }
            frame[page * width + x] = byte;
        }
    }
    frame
}

/// Write a page-major frame to display RAM.
fn write_frame(
    device: &mut Device<'_>,
    geometry: &Geometry,
    frame: &[u8],
) -> Result<(), ProbeError> {
    let col = geometry.column_offset;
    for (page, row) in frame.chunks(geometry.width).enumerate() {
        device.write(&[
            CONTROL_COMMAND,
            0xB0 | page as u8,
            col & 0x0F,
            0x10 | (col >> 4),
        ])?;

        let mut data = Vec::with_capacity(row.len() + 1);
        data.push(CONTROL_DATA);
        data.extend_from_slice(row);
        device.write(&data)?;
    }
    Ok(())
}

/// OLED presence and optional visual check.
pub struct Sh1106Probe;

/// Factory registered under `sh1106`.
pub fn create_probe() -> Box<dyn DeviceProbe> {
    Box::new(Sh1106Probe)
}

impl DeviceProbe for Sh1106Probe {
    fn kind(&self) -> &'static str {
        PROBE_SH1106
    }

    fn probe(
        &self,
        bus: &mut dyn DeviceBus,
        target: &ProbeTarget<'_>,
    ) -> Result<ProbeReport, ProbeError> {
        let geometry = Geometry::from_target(target)?;
        let mut device = Device::new(bus, target.address);

        let mut status = [0u8; 1];
        device.read(&mut status)?;
        device.write(&[CONTROL_COMMAND, CMD_NOP])?;

        if !target.visual {
            return Ok(ProbeReport::new(format!(
                "OLED responding (status 0x{:02X})",
                status[0]
            ))
            .with_payload(json!({ "status": status[0], "pattern": false })));
        }

        let hold = Duration::from_millis(target.arg_u64("hold_ms", DEFAULT_HOLD_MS));
        device.write(&init_sequence(geometry.height))?;
        write_frame(
            &mut device,
            &geometry,
            &test_pattern(geometry.width, geometry.height),
        )?;
        debug!(
            "OLED@0x{:02X} test pattern on screen for {}ms",
            target.address,
            hold.as_millis()
        );
        thread::sleep(hold);
        write_frame(
            &mut device,
            &geometry,
            &vec![0u8; geometry.width * geometry.pages()],
        )?;

        Ok(ProbeReport::new(format!(
            "OLED {}x{} test pattern shown for {}ms",
            geometry.width,
            geometry.height,
            hold.as_millis()
        ))
        .with_payload(json!({ "status": status[0], "pattern": true })))
    }
}
