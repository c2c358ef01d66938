//! MFRC522 register map and command codes.
//!
//! Only the registers touched by bring-up and resynchronization are listed.
//! Addresses are the 6-bit values from the MFRC522 datasheet (section 9);
//! the SPI address byte framing is the driver's concern.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reader register addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Register {
    /// Starts and stops command execution.
    Command = 0x01,

    /// Interrupt request bits.
    ComIrq = 0x04,

    /// Number of bytes stored in the FIFO buffer; bit 7 flushes it.
    FifoLevel = 0x0A,

    /// Adjustments for bit-oriented frames.
    BitFraming = 0x0D,

    /// First bit-collision detected on the RF interface.
    Coll = 0x0E,

    /// Controls the logical behavior of the antenna driver pins.
    TxControl = 0x14,

    /// Receiver gain.
    RfCfg = 0x26,

    /// Chip identification and firmware revision.
    Version = 0x37,
}

impl Register {
    /// Raw register address.
    #[must_use]
    pub fn addr(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Register::Command => "CommandReg",
            Register::ComIrq => "ComIrqReg",
            Register::FifoLevel => "FIFOLevelReg",
            Register::BitFraming => "BitFramingReg",
            Register::Coll => "CollReg",
            Register::TxControl => "TxControlReg",
            Register::RfCfg => "RFCfgReg",
            Register::Version => "VersionReg",
        };
        write!(f, "{}(0x{:02X})", name, self.addr())
    }
}

/// `CommandReg` value that cancels the running command.
pub const PCD_IDLE: u8 = 0x00;

/// Writing this to `ComIrqReg` clears every interrupt request bit.
pub const COM_IRQ_CLEAR_ALL: u8 = 0x7F;

/// `FIFOLevelReg` bit 7: flush the FIFO buffer.
pub const FIFO_FLUSH: u8 = 0x80;

/// `CollReg` bit 7: clear received bits after a collision.
pub const COLL_VALUES_AFTER_COLL: u8 = 0x80;

/// `TxControlReg` bits 0-1: drive both antenna pins (field on).
pub const TX_CONTROL_ANTENNA_ON: u8 = 0x03;
