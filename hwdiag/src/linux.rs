//! Linux `/dev/i2c-N` transport.
//!
//! Transfers go through the `I2C_RDWR` ioctl so an embedded-hal transaction
//! (write then read with repeated start) reaches the adapter as one combined
//! message list. The adapter timeout is set once with `I2C_TIMEOUT`.

use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};
use hwdiag_common::prelude::*;
use libc::c_int;
use nix::errno::Errno;
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use ioctl::{I2C_M_NOSTART, I2C_M_RD, I2cMsg, I2cRdwrIoctlData, i2c_rdwr, i2c_set_timeout};

mod ioctl {
    /// `I2C_TIMEOUT` request, argument in units of 10 ms.
    pub const I2C_TIMEOUT: u16 = 0x0702;
    /// `I2C_RDWR` request.
    pub const I2C_RDWR: u16 = 0x0707;

    /// Message is a read.
    pub const I2C_M_RD: u16 = 0x0001;
    /// Continue the previous message without a new start condition.
    pub const I2C_M_NOSTART: u16 = 0x4000;

    /// `struct i2c_msg` from `<linux/i2c.h>`.
    #[repr(C)]
    pub struct I2cMsg {
        pub addr: u16,
        pub flags: u16,
        pub len: u16,
        pub buf: *mut u8,
    }

    /// `struct i2c_rdwr_ioctl_data` from `<linux/i2c-dev.h>`.
    #[repr(C)]
    pub struct I2cRdwrIoctlData {
        pub msgs: *mut I2cMsg,
        pub nmsgs: u32,
    }

    nix::ioctl_write_ptr_bad!(i2c_rdwr, I2C_RDWR, I2cRdwrIoctlData);
    nix::ioctl_write_int_bad!(i2c_set_timeout, I2C_TIMEOUT);
}

/// I2C adapter character device.
pub struct LinuxI2cBus {
    file: File,
    path: PathBuf,
}

impl LinuxI2cBus {
    /// Open the adapter and program its transfer timeout.
    ///
    /// # Errors
    /// Returns `BusError::Io` if the device cannot be opened or configured.
    pub fn open(path: &Path, timeout: Duration) -> Result<Self, BusError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| BusError::Io(format!("{}: {e}", path.display())))?;

        let ticks = (timeout.as_millis() / 10).clamp(1, c_int::MAX as u128) as c_int;
        // SAFETY: fd is open for the lifetime of `file`; the request takes an int.
        unsafe { i2c_set_timeout(file.as_raw_fd(), ticks) }
            .map_err(|e| BusError::Io(format!("{}: I2C_TIMEOUT: {e}", path.display())))?;

        info!(
            "Opened I2C adapter {} (timeout {}ms)",
            path.display(),
            timeout.as_millis()
        );
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open the adapter named in the `[bus]` section.
    pub fn from_config(config: &BusConfig) -> Result<Self, BusError> {
        Self::open(&config.device, config.timeout())
    }

    /// Adapter path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ErrorType for LinuxI2cBus {
    type Error = BusError;
}

impl I2c<SevenBitAddress> for LinuxI2cBus {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if operations.is_empty() {
            return Ok(());
        }

        let mut msgs = Vec::with_capacity(operations.len());
        let mut previous_read = None;
        for op in operations.iter_mut() {
            let (read, len, buf) = match op {
                Operation::Read(buf) => (true, buf.len(), buf.as_mut_ptr()),
                Operation::Write(buf) => (false, buf.len(), buf.as_ptr().cast_mut()),
            };
            let len = u16::try_from(len)
                .map_err(|_| BusError::Io(format!("transfer of {len} bytes too long")))?;

            let mut flags = if read { I2C_M_RD } else { 0 };
            // Adjacent operations of the same direction form one contiguous transfer.
            if previous_read == Some(read) {
                flags |= I2C_M_NOSTART;
            }
            previous_read = Some(read);

            msgs.push(I2cMsg {
                addr: u16::from(address),
                flags,
                len,
                buf,
            });
        }

        let data = I2cRdwrIoctlData {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };

        // SAFETY: every message points into a buffer borrowed by `operations`,
        // which outlives the call.
        unsafe { i2c_rdwr(self.file.as_raw_fd(), &data) }
            .map(|_| ())
            .map_err(|errno| {
                debug!(
                    "I2C_RDWR to 0x{:02X} on {} failed: {}",
                    address,
                    self.path.display(),
                    errno
                );
                map_errno(errno)
            })
    }
}

/// Classify an adapter errno.
///
/// Follows the kernel's I2C fault code conventions: `ENXIO`/`EREMOTEIO` for
/// a missing acknowledge, `ETIMEDOUT` for a stuck transfer, `EAGAIN` for lost
/// arbitration.
fn map_errno(errno: Errno) -> BusError {
    match errno {
        Errno::ENXIO | Errno::EREMOTEIO => BusError::NoAcknowledge(AckStage::Unknown),
        Errno::ETIMEDOUT => BusError::Timeout,
        Errno::EAGAIN => BusError::ArbitrationLoss,
        other => BusError::Io(other.desc().to_string()),
    }
}
