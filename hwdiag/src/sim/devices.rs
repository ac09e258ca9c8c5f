//! Virtual peripherals for the simulated bus.

use crate::probes::bmx280::{
    REG_CALIB, REG_CHIP_ID, REG_CTRL_MEAS, REG_DATA, REG_RESET, REG_STATUS, STATUS_MEASURING,
};
use crate::probes::sht3x::{CMD_MEASURE_HIGH, crc8};
use hwdiag_common::prelude::*;

/// Behaviour of a device behind the simulated multiplexer.
///
/// Returning `BusError::NoAcknowledge` models a device that refuses the
/// transfer.
pub trait SimDevice: Send {
    /// Master writes `bytes`.
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError>;

    /// Master reads `buf.len()` bytes.
    fn read(&mut self, buf: &mut [u8]) -> Result<(), BusError>;
}

/// SHT3x with fixed readings.
pub struct SimSht3x {
    frame: [u8; 6],
    busy: bool,
    pending: bool,
}

impl SimSht3x {
    /// Sensor reporting `temperature` °C and `humidity` %RH.
    ///
    /// Values are clamped to what the raw format can carry (−45..130 °C).
    pub fn new(temperature: f64, humidity: f64) -> Self {
        let raw_t = ((temperature + 45.0) / 175.0 * 65535.0).round().clamp(0.0, 65535.0) as u16;
        let raw_h = (humidity / 100.0 * 65535.0).round().clamp(0.0, 65535.0) as u16;

        let mut frame = [0u8; 6];
        for (chunk, raw) in frame.chunks_mut(3).zip([raw_t, raw_h]) {
            let word = raw.to_be_bytes();
            chunk[..2].copy_from_slice(&word);
            chunk[2] = crc8(&word);
        }

        Self {
            frame,
            busy: false,
            pending: false,
        }
    }

    /// Sensor that accepts commands but never finishes a conversion.
    pub fn busy() -> Self {
        Self {
            busy: true,
            ..Self::new(0.0, 0.0)
        }
    }
}

impl SimDevice for SimSht3x {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        if !bytes.is_empty() {
            self.pending = bytes == CMD_MEASURE_HIGH;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        if self.busy || !self.pending {
            return Err(BusError::NoAcknowledge(AckStage::Address));
        }
        self.pending = false;
        for (dst, src) in buf.iter_mut().zip(self.frame.iter().cycle()) {
            *dst = *src;
        }
        Ok(())
    }
}

/// BMP280/BME280 register file.
///
/// Calibration is chosen so compensation is linear:
/// `T = 6·adc_t/16384 − 48` and `p = 1048576 − adc_p` Pa.
/// A forced conversion finishes instantly and returns the chip to sleep
/// unless the chip is stalled.
pub struct SimBmx280 {
    regs: [u8; 256],
    pointer: u8,
    stalled: bool,
}

impl SimBmx280 {
    const DIG_T1: u16 = 8192;
    const DIG_T2: i16 = 30720;
    const DIG_P1: u16 = 6250;
    const ADC_MAX: f64 = 0xFFFFF as f64;

    /// Chip answering `chip_id` with fixed readings.
    pub fn new(chip_id: u8, temperature: f64, pressure_hpa: f64) -> Self {
        let mut regs = [0u8; 256];
        regs[REG_CHIP_ID as usize] = chip_id;

        let calib = REG_CALIB as usize;
        regs[calib..calib + 2].copy_from_slice(&Self::DIG_T1.to_le_bytes());
        regs[calib + 2..calib + 4].copy_from_slice(&Self::DIG_T2.to_le_bytes());
        regs[calib + 6..calib + 8].copy_from_slice(&Self::DIG_P1.to_le_bytes());

        let adc_t = ((temperature + 48.0) * 16384.0 / 6.0).round().clamp(0.0, Self::ADC_MAX) as u32;
        let adc_p = (1048576.0 - pressure_hpa * 100.0).round().clamp(0.0, Self::ADC_MAX) as u32;

        let data = REG_DATA as usize;
        for (offset, adc) in [(0, adc_p), (3, adc_t)] {
            regs[data + offset] = (adc >> 12) as u8;
            regs[data + offset + 1] = (adc >> 4) as u8;
            regs[data + offset + 2] = ((adc & 0x0F) << 4) as u8;
        }

        Self {
            regs,
            pointer: 0,
            stalled: false,
        }
    }

    /// Chip whose conversions never finish.
    pub fn stalled(chip_id: u8) -> Self {
        Self {
            stalled: true,
            ..Self::new(chip_id, 21.0, 1013.25)
        }
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        match reg {
            REG_RESET | REG_STATUS => {}
            REG_CTRL_MEAS if value & 0x03 == 0x01 || value & 0x03 == 0x02 => {
                if self.stalled {
                    self.regs[REG_STATUS as usize] = STATUS_MEASURING;
                    self.regs[REG_CTRL_MEAS as usize] = value;
                } else {
                    self.regs[REG_CTRL_MEAS as usize] = value & !0x03;
                }
            }
            _ => self.regs[reg as usize] = value,
        }
    }
}

impl SimDevice for SimBmx280 {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        let Some(&first) = bytes.first() else {
            return Ok(());
        };
        self.pointer = first;
        for pair in bytes.chunks_exact(2) {
            self.write_register(pair[0], pair[1]);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        for byte in buf.iter_mut() {
            *byte = self.regs[self.pointer as usize];
            self.pointer = self.pointer.wrapping_add(1);
        }
        Ok(())
    }
}

/// SH1106/SH1107 controller.
pub struct SimSh1106 {
    display_on: bool,
}

impl SimSh1106 {
    /// Controller in its reset state (display off).
    pub fn new() -> Self {
        Self { display_on: false }
    }

    /// Status byte: bit 6 set while the display is off.
    fn status(&self) -> u8 {
        if self.display_on { 0x00 } else { 0x40 }
    }
}

impl Default for SimSh1106 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice for SimSh1106 {
    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        if let [0x00, commands @ ..] = bytes {
            for command in commands {
                match command {
                    0xAE => self.display_on = false,
                    0xAF => self.display_on = true,
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        buf.fill(self.status());
        Ok(())
    }
}
