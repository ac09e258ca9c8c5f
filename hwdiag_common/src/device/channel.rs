//! Multiplexer control register model.
//!
//! The PCA9548A control register is one bit per downstream channel. Writing a
//! value replaces the active set; this harness only ever writes a single bit
//! or zero.

use crate::device::consts::MUX_CHANNELS;
use bitflags::bitflags;
use static_assertions::const_assert;

const_assert!(MUX_CHANNELS as u32 <= u8::BITS);

bitflags! {
    /// Channel enable bits of the multiplexer control register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChannelMask: u8 {
        /// SD0/SC0
        const CH0 = 0x01;
        /// SD1/SC1
        const CH1 = 0x02;
        /// SD2/SC2
        const CH2 = 0x04;
        /// SD3/SC3
        const CH3 = 0x08;
        /// SD4/SC4
        const CH4 = 0x10;
        /// SD5/SC5
        const CH5 = 0x20;
        /// SD6/SC6
        const CH6 = 0x40;
        /// SD7/SC7
        const CH7 = 0x80;
    }
}

impl ChannelMask {
    /// One-hot mask for `channel`, or `None` when the channel does not exist.
    pub const fn single(channel: u8) -> Option<Self> {
        if channel < MUX_CHANNELS {
            Some(Self::from_bits_truncate(1 << channel))
        } else {
            None
        }
    }

    /// Returns the channel number if exactly one channel is enabled.
    pub const fn only_channel(&self) -> Option<u8> {
        let bits = self.bits();
        if bits.count_ones() == 1 {
            Some(bits.trailing_zeros() as u8)
        } else {
            None
        }
    }

    /// Returns true if `channel` is enabled in this mask.
    pub fn has_channel(&self, channel: u8) -> bool {
        Self::single(channel).is_some_and(|bit| self.contains(bit))
    }
}
