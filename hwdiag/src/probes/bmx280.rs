//! Bosch BMP280/BME280 pressure probe.
//!
//! Identifies the chip, soft-resets it, reads the factory calibration and
//! takes one forced-mode measurement, compensated with the datasheet's
//! floating point formulas.

use super::check_range;
use super::device::Device;
use hwdiag_common::prelude::*;
use serde_json::json;
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

/// Chip id register.
pub const REG_CHIP_ID: u8 = 0xD0;
/// Soft reset register.
pub const REG_RESET: u8 = 0xE0;
/// First calibration register (`dig_T1` LSB).
pub const REG_CALIB: u8 = 0x88;
/// Humidity oversampling (BME280 only).
pub const REG_CTRL_HUM: u8 = 0xF2;
/// Conversion status.
pub const REG_STATUS: u8 = 0xF3;
/// Temperature/pressure oversampling and mode.
pub const REG_CTRL_MEAS: u8 = 0xF4;
/// Standby, filter and SPI settings.
pub const REG_CONFIG: u8 = 0xF5;
/// First measurement register (`press_msb`).
pub const REG_DATA: u8 = 0xF7;

/// `ctrl_meas`: osrs_t x1, osrs_p x1, forced mode.
pub const CTRL_MEAS_FORCED: u8 = 0x25;
/// `measuring` bit of the status register.
pub const STATUS_MEASURING: u8 = 0x08;

/// BME280 chip id.
pub const CHIP_ID_BME280: u8 = 0x60;
/// BMP280 chip id.
pub const CHIP_ID_BMP280: u8 = 0x58;

/// Soft reset magic.
const RESET_WORD: u8 = 0xB6;
/// ADC value of a skipped or unfinished conversion.
const ADC_SKIPPED: u32 = 0x80000;
/// Start-up time after soft reset.
const RESET_DELAY: Duration = Duration::from_millis(10);
/// Default bound on the conversion wait (`measure_ms` arg).
const DEFAULT_MEASURE_MS: u64 = 50;
/// Status register poll interval.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Chip variant from the id register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip {
    /// Pressure and temperature
    Bmp280,
    /// Pressure, temperature and humidity
    Bme280,
}

impl Chip {
    /// Identify a chip id.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            CHIP_ID_BMP280 => Some(Chip::Bmp280),
            CHIP_ID_BME280 => Some(Chip::Bme280),
            _ => None,
        }
    }

    /// Part name.
    pub fn name(&self) -> &'static str {
        match self {
            Chip::Bmp280 => "BMP280",
            Chip::Bme280 => "BME280",
        }
    }
}

/// Temperature and pressure trimming parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    t1: f64,
    t2: f64,
    t3: f64,
    p: [f64; 9],
}

impl Calibration {
    /// Decode the 24-byte block starting at `0x88`.
    pub fn from_bytes(raw: &[u8; 24]) -> Self {
        let unsigned = |i: usize| f64::from(u16::from_le_bytes([raw[i], raw[i + 1]]));
        let signed = |i: usize| f64::from(i16::from_le_bytes([raw[i], raw[i + 1]]));

        let mut p = [0.0; 9];
        p[0] = unsigned(6);
        for (n, slot) in p.iter_mut().enumerate().skip(1) {
            *slot = signed(6 + 2 * n);
        }

        Self {
            t1: unsigned(0),
            t2: signed(2),
            t3: signed(4),
            p,
        }
    }

    /// Compensated temperature in °C and the `t_fine` carry.
    pub fn temperature(&self, adc_t: u32) -> (f64, f64) {
        let adc = f64::from(adc_t);
        let var1 = (adc / 16384.0 - self.t1 / 1024.0) * self.t2;
        let var2 = (adc / 131072.0 - self.t1 / 8192.0).powi(2) * self.t3;
        let t_fine = var1 + var2;
        (t_fine / 5120.0, t_fine)
    }

    /// Compensated pressure in Pa, `None` when the trimming would divide by zero.
    pub fn pressure(&self, adc_p: u32, t_fine: f64) -> Option<f64> {
        let p = &self.p;
        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * p[5] / 32768.0;
        var2 += var1 * p[4] * 2.0;
        var2 = var2 / 4.0 + p[3] * 65536.0;
        var1 = (p[2] * var1 * var1 / 524288.0 + p[1] * var1) / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * p[0];
        if var1 == 0.0 {
            return None;
        }

        let mut pressure = 1048576.0 - f64::from(adc_p);
        pressure = (pressure - var2 / 4096.0) * 6250.0 / var1;
        var1 = p[8] * pressure * pressure / 2147483648.0;
        var2 = pressure * p[7] / 32768.0;
        Some(pressure + (var1 + var2 + p[6]) / 16.0)
    }
}

/// Split the 6-byte burst at `0xF7` into 20-bit pressure and temperature.
pub fn split_adc(data: &[u8; 6]) -> (u32, u32) {
    let adc = |b: &[u8]| (u32::from(b[0]) << 12) | (u32::from(b[1]) << 4) | (u32::from(b[2]) >> 4);
    (adc(&data[0..3]), adc(&data[3..6]))
}

/// Poll the status register until the forced conversion has finished.
fn wait_conversion(device: &mut Device<'_>, timeout: Duration) -> Result<(), ProbeError> {
    let deadline = Instant::now() + timeout;
    let mut polls = 0u32;

    loop {
        polls += 1;
        let [status] = device.read_registers::<1>(REG_STATUS)?;
        if status & STATUS_MEASURING == 0 {
            trace!("BMx280@0x{:02X} ready after {} polls", device.address(), polls);
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(ProbeError::Timeout(format!(
                "conversion still running after {}ms ({} polls)",
                timeout.as_millis(),
                polls
            )));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// BMP280/BME280 measurement check.
pub struct Bmx280Probe;

/// Factory registered under `bmx280`.
pub fn create_probe() -> Box<dyn DeviceProbe> {
    Box::new(Bmx280Probe)
}

impl DeviceProbe for Bmx280Probe {
    fn kind(&self) -> &'static str {
        PROBE_BMX280
    }

    fn probe(
        &self,
        bus: &mut dyn DeviceBus,
        target: &ProbeTarget<'_>,
    ) -> Result<ProbeReport, ProbeError> {
        let measure = Duration::from_millis(target.arg_u64("measure_ms", DEFAULT_MEASURE_MS));
        let mut device = Device::new(bus, target.address);

        let [chip_id] = device.read_registers::<1>(REG_CHIP_ID)?;
        let chip = Chip::from_id(chip_id).ok_or_else(|| {
            ProbeError::ImplausibleReading(format!("unknown chip id 0x{chip_id:02X}"))
        })?;

        device.write(&[REG_RESET, RESET_WORD])?;
        thread::sleep(RESET_DELAY);

        let calibration = Calibration::from_bytes(&device.read_registers::<24>(REG_CALIB)?);

        if chip == Chip::Bme280 {
            // Humidity oversampling only latches on the next ctrl_meas write.
            device.write(&[REG_CTRL_HUM, 0x01])?;
        }
        // Filter off. Only writable while the chip sleeps.
        device.write(&[REG_CONFIG, 0xA0])?;
        device.write(&[REG_CTRL_MEAS, CTRL_MEAS_FORCED])?;
        wait_conversion(&mut device, measure)?;

        let (adc_p, adc_t) = split_adc(&device.read_registers::<6>(REG_DATA)?);
        if adc_t == ADC_SKIPPED {
            return Err(ProbeError::ImplausibleReading(
                "measurement not ready".to_string(),
            ));
        }

        let (temperature, t_fine) = calibration.temperature(adc_t);
        let temperature = check_range("temperature", temperature, TEMPERATURE_RANGE_C, "°C")?;
        let pressure = calibration.pressure(adc_p, t_fine).ok_or_else(|| {
            ProbeError::ImplausibleReading("pressure trimming parameter dig_P1 is zero".to_string())
        })? / 100.0;
        let pressure = check_range("pressure", pressure, PRESSURE_RANGE_HPA, "hPa")?;

        Ok(ProbeReport::new(format!(
            "{} {temperature:.1} °C, {pressure:.1} hPa",
            chip.name()
        ))
        .with_payload(json!({
            "chip": chip.name(),
            "temperature_c": temperature,
            "pressure_hpa": pressure,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::{ChannelSelector, Pca9548a};
    use crate::sim::{BusOp, SimulatedBus};

    fn run(bus: SimulatedBus, unit: &DeviceConfig) -> Result<ProbeReport, ProbeError> {
        let mut selector = Pca9548a::new(bus, DEFAULT_MUX_ADDRESS).with_settle(Duration::ZERO);
        let bus = selector.select(unit.channel).unwrap();
        Bmx280Probe.probe(bus, &ProbeTarget::for_unit(unit))
    }

    fn quick_unit(channel: u8, address: u8) -> DeviceConfig {
        let mut args = ProbeArgs::new();
        args.insert("measure_ms".to_string(), toml::Value::Integer(0));
        DeviceConfig::new("baro", PROBE_BMX280, channel, address).with_args(args)
    }

    /// Sample calibration and readings from the BMP280 datasheet.
    #[test]
    fn datasheet_compensation_example() {
        let mut raw = [0u8; 24];
        let words: [u16; 12] = [
            27504,
            26435,
            (-1000i16) as u16,
            36477,
            (-10685i16) as u16,
            3024,
            2855,
            140,
            (-7i16) as u16,
            15500,
            (-14600i16) as u16,
            6000,
        ];
        for (i, w) in words.iter().enumerate() {
            raw[2 * i..2 * i + 2].copy_from_slice(&w.to_le_bytes());
        }
        let cal = Calibration::from_bytes(&raw);

        let (t, t_fine) = cal.temperature(519888);
        assert!((t - 25.08).abs() < 0.01, "temperature {t}");

        let p = cal.pressure(415148, t_fine).unwrap();
        assert!((p - 100653.27).abs() < 1.0, "pressure {p}");
    }

    #[test]
    fn split_adc_layout() {
        let (p, t) = split_adc(&[0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00]);
        assert_eq!(p, 415148);
        assert_eq!(t, 519888);
    }

    #[test]
    fn zero_p1_has_no_pressure() {
        let cal = Calibration::from_bytes(&[0u8; 24]);
        assert_eq!(cal.pressure(400000, 0.0), None);
    }

    #[test]
    fn reads_bmp280() {
        let bus = SimulatedBus::new(DEFAULT_MUX_ADDRESS).with_bmx280(
            1,
            0x76,
            CHIP_ID_BMP280,
            21.0,
            1013.25,
        );
        let report = run(bus, &quick_unit(1, 0x76)).unwrap();
        let payload = report.payload.unwrap();
        assert_eq!(payload["chip"], "BMP280");
        let t = payload["temperature_c"].as_f64().unwrap();
        let p = payload["pressure_hpa"].as_f64().unwrap();
        assert!((t - 21.0).abs() < 0.01, "temperature {t}");
        assert!((p - 1013.25).abs() < 0.01, "pressure {p}");
    }

    #[test]
    fn bme280_configures_humidity() {
        let bus = SimulatedBus::new(DEFAULT_MUX_ADDRESS).with_bmx280(
            2,
            0x77,
            CHIP_ID_BME280,
            21.0,
            1000.0,
        );
        let log = bus.log();
        let report = run(bus, &quick_unit(2, 0x77)).unwrap();
        assert!(report.message.starts_with("BME280"));
        assert!(
            log.lock()
                .iter()
                .any(|e| e.address == 0x77 && e.op == BusOp::Write(vec![0xF2, 0x01]))
        );
    }

    #[test]
    fn unknown_chip_is_implausible() {
        let bus = SimulatedBus::new(DEFAULT_MUX_ADDRESS).with_bmx280(1, 0x76, 0x55, 21.0, 1013.0);
        let err = run(bus, &quick_unit(1, 0x76)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ImplausibleReading);
        assert!(err.to_string().contains("0x55"));
    }

    #[test]
    fn overheated_reading_is_implausible() {
        let bus =
            SimulatedBus::new(DEFAULT_MUX_ADDRESS).with_bmx280(1, 0x76, CHIP_ID_BMP280, 250.0, 1013.0);
        let err = run(bus, &quick_unit(1, 0x76)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ImplausibleReading);
    }

    #[test]
    fn measurement_is_forced_once() {
        let bus = SimulatedBus::new(DEFAULT_MUX_ADDRESS).with_bmx280(
            1,
            0x76,
            CHIP_ID_BMP280,
            21.0,
            1013.25,
        );
        let log = bus.log();
        run(bus, &quick_unit(1, 0x76)).unwrap();

        let log = log.lock();
        let ctrl_writes: Vec<_> = log
            .iter()
            .filter(|e| e.address == 0x76)
            .filter_map(|e| match &e.op {
                BusOp::Write(bytes) if bytes.first() == Some(&REG_CTRL_MEAS) => Some(bytes.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ctrl_writes, vec![vec![REG_CTRL_MEAS, CTRL_MEAS_FORCED]]);
        assert!(
            log.iter()
                .any(|e| e.address == 0x76 && e.op == BusOp::Write(vec![REG_STATUS]))
        );
    }

    #[test]
    fn stalled_conversion_times_out() {
        let bus = SimulatedBus::new(DEFAULT_MUX_ADDRESS).with_stalled_bmx280(1, 0x76, CHIP_ID_BMP280);
        let err = run(bus, &quick_unit(1, 0x76)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert!(err.to_string().contains("conversion still running"));
    }

    #[test]
    fn absent_chip_is_not_present() {
        let bus = SimulatedBus::new(DEFAULT_MUX_ADDRESS);
        let err = run(bus, &quick_unit(1, 0x76)).unwrap_err();
        assert_eq!(err, ProbeError::NotPresent { address: 0x76 });
    }
}
