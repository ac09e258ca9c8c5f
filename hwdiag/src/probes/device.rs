//! Addressed device handle shared by the probes.

use hwdiag_common::prelude::*;

/// One device on the selected channel.
///
/// Tracks whether the device has acknowledged anything yet so a missing
/// acknowledge is classified as `NotPresent` before first contact and as a
/// transport failure afterwards.
pub(crate) struct Device<'a> {
    bus: &'a mut dyn DeviceBus,
    address: u8,
    contacted: bool,
}

impl<'a> Device<'a> {
    pub(crate) fn new(bus: &'a mut dyn DeviceBus, address: u8) -> Self {
        Self {
            bus,
            address,
            contacted: false,
        }
    }

    pub(crate) fn address(&self) -> u8 {
        self.address
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) -> Result<(), ProbeError> {
        let result = self.bus.write(self.address, bytes);
        self.track(result)
    }

    pub(crate) fn read(&mut self, buf: &mut [u8]) -> Result<(), ProbeError> {
        let result = self.bus.read(self.address, buf);
        self.track(result)
    }

    pub(crate) fn write_read(&mut self, bytes: &[u8], buf: &mut [u8]) -> Result<(), ProbeError> {
        let result = self.bus.write_read(self.address, bytes, buf);
        self.track(result)
    }

    /// Read `N` bytes starting at register `reg`.
    pub(crate) fn read_registers<const N: usize>(&mut self, reg: u8) -> Result<[u8; N], ProbeError> {
        let mut buf = [0u8; N];
        self.write_read(&[reg], &mut buf)?;
        Ok(buf)
    }

    /// Single read returning the raw bus error, for polling loops.
    pub(crate) fn try_read(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        let result = self.bus.read(self.address, buf);
        if result.is_ok() {
            self.contacted = true;
        }
        result
    }

    /// Classify a raw bus error with the current contact state.
    pub(crate) fn classify(&self, err: BusError) -> ProbeError {
        ProbeError::from_bus(err, self.address, self.contacted)
    }

    fn track(&mut self, result: Result<(), BusError>) -> Result<(), ProbeError> {
        match result {
            Ok(()) => {
                self.contacted = true;
                Ok(())
            }
            Err(err) => Err(self.classify(err)),
        }
    }
}
