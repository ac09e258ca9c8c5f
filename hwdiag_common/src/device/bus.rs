//! Bus transport seam.
//!
//! Every transport (Linux character device, simulated bus) implements the
//! blocking `embedded_hal::i2c::I2c` trait with [`BusError`] as its error
//! type. Probes and the channel selector only see `&mut dyn DeviceBus`.

use embedded_hal::i2c::{ErrorKind, I2c, NoAcknowledgeSource, SevenBitAddress};
use thiserror::Error;

/// Transfer phase that was not acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStage {
    /// The address byte was not acknowledged (nobody home).
    Address,
    /// A data byte was not acknowledged.
    Data,
    /// The adapter cannot tell which phase failed.
    Unknown,
}

/// Error types for bus transfers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Target did not acknowledge
    #[error("no acknowledge ({0:?} phase)")]
    NoAcknowledge(AckStage),

    /// Transfer did not complete within the adapter timeout
    #[error("bus transfer timed out")]
    Timeout,

    /// Another master won arbitration
    #[error("bus arbitration lost")]
    ArbitrationLoss,

    /// Any other adapter or OS level failure
    #[error("bus I/O error: {0}")]
    Io(String),
}

impl BusError {
    /// Returns true if the address phase (or an unknown phase) was not acknowledged.
    pub fn is_address_nack(&self) -> bool {
        matches!(
            self,
            BusError::NoAcknowledge(AckStage::Address | AckStage::Unknown)
        )
    }
}

impl embedded_hal::i2c::Error for BusError {
    fn kind(&self) -> ErrorKind {
        match self {
            BusError::NoAcknowledge(AckStage::Address) => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
            }
            BusError::NoAcknowledge(AckStage::Data) => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)
            }
            BusError::NoAcknowledge(AckStage::Unknown) => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)
            }
            BusError::ArbitrationLoss => ErrorKind::ArbitrationLoss,
            BusError::Timeout | BusError::Io(_) => ErrorKind::Other,
        }
    }
}

/// Object-safe I2C bus with the harness error type.
pub trait DeviceBus: I2c<SevenBitAddress, Error = BusError> {}

impl<T> DeviceBus for T where T: I2c<SevenBitAddress, Error = BusError> {}
