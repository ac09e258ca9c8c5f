//! Virtual root bus with a PCA9548A and downstream devices.

use super::devices::{SimBmx280, SimDevice, SimSh1106, SimSht3x};
use crate::probes::bmx280::CHIP_ID_BMP280;
use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};
use hwdiag_common::prelude::*;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Temperature reported by devices populated from a plan (°C).
const NOMINAL_TEMPERATURE_C: f64 = 22.5;
/// Humidity reported by devices populated from a plan (%RH).
const NOMINAL_HUMIDITY_PCT: f64 = 45.0;
/// Pressure reported by devices populated from a plan (hPa).
const NOMINAL_PRESSURE_HPA: f64 = 1013.25;

/// One bus operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    /// Bytes written
    Write(Vec<u8>),
    /// Number of bytes requested
    Read(usize),
}

/// One logged operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEvent {
    /// Target address
    pub address: u8,
    /// Operation
    pub op: BusOp,
    /// Multiplexer control register when the operation started
    pub control: ChannelMask,
    /// Whether the target acknowledged
    pub acked: bool,
}

/// Shared handle to the transaction log.
pub type TransactionLog = Arc<Mutex<Vec<BusEvent>>>;

/// Software root bus.
///
/// The multiplexer answers at its own address on the root bus. A
/// downstream device answers only while its channel is enabled in the
/// control register.
pub struct SimulatedBus {
    /// Multiplexer address
    mux_address: u8,
    /// Multiplexer control register
    control: ChannelMask,
    /// Multiplexer NACKs everything
    mux_unresponsive: bool,
    /// Devices keyed by (channel, address)
    devices: BTreeMap<(u8, u8), Box<dyn SimDevice>>,
    /// Every operation, in order
    log: TransactionLog,
}

impl SimulatedBus {
    /// Empty bus with a multiplexer at `mux_address`.
    pub fn new(mux_address: u8) -> Self {
        Self {
            mux_address,
            control: ChannelMask::empty(),
            mux_unresponsive: false,
            devices: BTreeMap::new(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Bus populated with a healthy device for every enabled unit of a plan.
    ///
    /// Units with an out-of-range channel or an unknown probe kind get no
    /// device.
    pub fn from_config(config: &DiagConfig) -> Self {
        let mut bus = Self::new(config.bus.mux_address);
        for unit in config.tests.iter().filter(|u| u.enabled) {
            if ChannelMask::single(unit.channel).is_none() {
                continue;
            }
            bus = match unit.probe.as_str() {
                PROBE_SHT3X => bus.with_sht3x(
                    unit.channel,
                    unit.address,
                    NOMINAL_TEMPERATURE_C,
                    NOMINAL_HUMIDITY_PCT,
                ),
                PROBE_BMX280 => bus.with_bmx280(
                    unit.channel,
                    unit.address,
                    CHIP_ID_BMP280,
                    NOMINAL_TEMPERATURE_C,
                    NOMINAL_PRESSURE_HPA,
                ),
                PROBE_SH1106 => bus.with_sh1106(unit.channel, unit.address),
                _ => bus,
            };
        }
        debug!("Simulated bus populated with {} devices", bus.devices.len());
        bus
    }

    /// Attach a device.
    pub fn with_device(mut self, channel: u8, address: u8, device: Box<dyn SimDevice>) -> Self {
        self.devices.insert((channel, address), device);
        self
    }

    /// Attach an SHT3x reporting fixed values.
    pub fn with_sht3x(self, channel: u8, address: u8, temperature: f64, humidity: f64) -> Self {
        self.with_device(channel, address, Box::new(SimSht3x::new(temperature, humidity)))
    }

    /// Attach an SHT3x that never finishes a conversion.
    pub fn with_busy_sht3x(self, channel: u8, address: u8) -> Self {
        self.with_device(channel, address, Box::new(SimSht3x::busy()))
    }

    /// Attach a BMP280/BME280 reporting fixed values.
    pub fn with_bmx280(
        self,
        channel: u8,
        address: u8,
        chip_id: u8,
        temperature: f64,
        pressure_hpa: f64,
    ) -> Self {
        self.with_device(
            channel,
            address,
            Box::new(SimBmx280::new(chip_id, temperature, pressure_hpa)),
        )
    }

    /// Attach a BMP280/BME280 whose conversions never finish.
    pub fn with_stalled_bmx280(self, channel: u8, address: u8, chip_id: u8) -> Self {
        self.with_device(channel, address, Box::new(SimBmx280::stalled(chip_id)))
    }

    /// Attach an OLED controller.
    pub fn with_sh1106(self, channel: u8, address: u8) -> Self {
        self.with_device(channel, address, Box::new(SimSh1106::new()))
    }

    /// Make the multiplexer NACK every transfer.
    pub fn with_unresponsive_mux(mut self) -> Self {
        self.mux_unresponsive = true;
        self
    }

    /// Handle to the transaction log.
    pub fn log(&self) -> TransactionLog {
        Arc::clone(&self.log)
    }

    /// Current multiplexer control register.
    pub fn control(&self) -> ChannelMask {
        self.control
    }

    fn record(&self, address: u8, op: BusOp, control: ChannelMask, acked: bool) {
        trace!("sim 0x{:02X} {:?} ack={}", address, op, acked);
        self.log.lock().push(BusEvent {
            address,
            op,
            control,
            acked,
        });
    }

    fn mux_op(&mut self, op: &mut Operation<'_>) -> Result<(), BusError> {
        if self.mux_unresponsive {
            return Err(BusError::NoAcknowledge(AckStage::Address));
        }
        match op {
            Operation::Write(bytes) => {
                if let Some(&last) = bytes.last() {
                    self.control = ChannelMask::from_bits_retain(last);
                }
            }
            Operation::Read(buf) => buf.fill(self.control.bits()),
        }
        Ok(())
    }

    fn device_op(&mut self, address: u8, op: &mut Operation<'_>) -> Result<(), BusError> {
        let control = self.control;
        let device = self
            .devices
            .iter_mut()
            .find(|((channel, addr), _)| *addr == address && control.has_channel(*channel))
            .map(|(_, device)| device)
            .ok_or(BusError::NoAcknowledge(AckStage::Address))?;

        match op {
            Operation::Write(bytes) => device.write(bytes),
            Operation::Read(buf) => device.read(buf),
        }
    }
}

impl ErrorType for SimulatedBus {
    type Error = BusError;
}

impl I2c<SevenBitAddress> for SimulatedBus {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for op in operations.iter_mut() {
            let control = self.control;
            let logged = match op {
                Operation::Write(bytes) => BusOp::Write(bytes.to_vec()),
                Operation::Read(buf) => BusOp::Read(buf.len()),
            };

            let result = if address == self.mux_address {
                self.mux_op(op)
            } else {
                self.device_op(address, op)
            };

            self.record(address, logged, control, result.is_ok());
            result?;
        }
        Ok(())
    }
}
