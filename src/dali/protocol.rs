//! # DALI Protocol Constants and Types
//!
//! Core frame definitions for the DALI forward/backward exchange.

use crate::error::{DaliBridgeError, Result};

/// Broadcast selector byte: addresses every device on the bus
pub const BROADCAST_SELECTOR: u8 = 0xFF;

/// Broadcast command: all lamps to full level
pub const ALL_ON: u8 = 0x05;

/// Broadcast command: all lamps off
pub const ALL_OFF: u8 = 0x06;

/// Addressed command bits for "turn on" (recall max level)
pub const TURN_ON_COMMAND: u16 = 0x0105;

/// Addressed command bits for "turn off"
pub const TURN_OFF_COMMAND: u16 = 0x0100;

/// Command bits for "query device type"
pub const QUERY_DEVICE_TYPE_COMMAND: u16 = 0x0199;

/// Complete frame for "query short address" (special command, no selector)
pub const QUERY_SHORT_ADDRESS_FRAME: u16 = 0xBB00;

/// Mask keeping a shifted short address inside the selector field
pub const SHORT_ADDRESS_MASK: u16 = 0x7E00;

/// Bit position of the short address within a forward frame
pub const SHORT_ADDRESS_SHIFT: u16 = 9;

/// Highest valid short address (6-bit field)
pub const SHORT_ADDRESS_MAX: u8 = 63;

/// Number of data bits in a forward frame
pub const FORWARD_FRAME_BITS: u32 = 16;

/// Number of data bits in a backward frame
pub const BACKWARD_FRAME_BITS: u32 = 8;

/// Half-bit slots emitted per forward transfer: start-bit second half,
/// 32 data half-bits, then stop condition and settling
pub const HALF_BIT_SLOTS: u8 = 45;

/// First slot of the stop condition (line held high from here on)
pub const SLOT_STOP_BEGIN: u8 = 33;

/// Slot at which the dispatcher switches the timer into receive mode and
/// arms the reply watchdog
pub const SLOT_ARM_REPLY: u8 = 44;

/// Logical level of the bus line
///
/// `High` is the idle level; a forward frame starts by pulling the line low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineLevel {
    Low,
    High,
}

impl LineLevel {
    /// The opposite level
    pub fn inverted(self) -> Self {
        match self {
            LineLevel::Low => LineLevel::High,
            LineLevel::High => LineLevel::Low,
        }
    }

    pub fn is_high(self) -> bool {
        matches!(self, LineLevel::High)
    }

    /// Level carrying a data half-bit of the given value
    pub fn from_bit(bit: bool) -> Self {
        if bit { LineLevel::High } else { LineLevel::Low }
    }
}

/// Validated 6-bit short address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortAddress(u8);

impl ShortAddress {
    /// Create a short address, rejecting values outside the 6-bit range
    ///
    /// # Errors
    ///
    /// Returns [`DaliBridgeError::InvalidAddress`] for addresses above 63.
    pub fn new(address: u8) -> Result<Self> {
        if address > SHORT_ADDRESS_MAX {
            return Err(DaliBridgeError::InvalidAddress(address));
        }
        Ok(Self(address))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// The address shifted into the selector field of a forward frame
    fn selector(self) -> u16 {
        SHORT_ADDRESS_MASK & ((self.0 as u16) << SHORT_ADDRESS_SHIFT)
    }
}

/// 16-bit forward frame, immutable once a transfer starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardFrame(u16);

impl ForwardFrame {
    /// Wrap a raw 16-bit frame
    ///
    /// The escape hatch for command layouts the typed builders do not cover.
    pub fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Broadcast `command` to every device on the bus
    pub fn broadcast(command: u8) -> Self {
        Self(((BROADCAST_SELECTOR as u16) << 8) | command as u16)
    }

    /// Turn the addressed device on (recall max level)
    pub fn turn_on(address: ShortAddress) -> Self {
        Self(address.selector() | TURN_ON_COMMAND)
    }

    /// Turn the addressed device off
    pub fn turn_off(address: ShortAddress) -> Self {
        Self(address.selector() | TURN_OFF_COMMAND)
    }

    /// Ask the addressed device for its device type
    pub fn query_device_type(address: ShortAddress) -> Self {
        Self(((address.value() as u16) << SHORT_ADDRESS_SHIFT) | QUERY_DEVICE_TYPE_COMMAND)
    }

    /// Ask an unaddressed device for its programmed short address
    pub fn query_short_address() -> Self {
        Self(QUERY_SHORT_ADDRESS_FRAME)
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    /// Data bit at position `n` (bit 15 is transmitted first)
    pub fn bit(self, n: u32) -> bool {
        (self.0 >> n) & 1 == 1
    }
}

/// Backward-frame accumulator
///
/// Bits are shifted in newest-least-significant, so the seeded start bit
/// ends up as the most significant received bit and doubles as the
/// completion marker: a frame is complete exactly when the start bit sits
/// immediately above the expected payload width.
///
/// The register is wider than the 9 bits a reply needs so that the same
/// machinery can reassemble a looped-back 16-bit forward frame in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackwardFrame {
    bits: u32,
}

impl BackwardFrame {
    /// True until the first bit (the start bit) has been shifted in
    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Append one decoded half-bit value
    pub fn push(&mut self, bit: bool) {
        self.bits = (self.bits << 1) | bit as u32;
    }

    /// Discard everything received so far
    pub fn reset(&mut self) {
        self.bits = 0;
    }

    /// Raw accumulator contents, start bit included
    pub fn raw_bits(self) -> u32 {
        self.bits
    }

    /// Payload of a completed frame of `width` data bits
    ///
    /// Returns `None` unless the start-bit marker sits exactly at `width`,
    /// i.e. the frame received precisely the expected number of bits.
    pub fn completed_value(self, width: u32) -> Option<u16> {
        if self.bits >> width == 1 {
            Some((self.bits & ((1 << width) - 1)) as u16)
        } else {
            None
        }
    }

    /// The answer byte of a completed 8-bit backward frame
    pub fn answer(self) -> Option<u8> {
        self.completed_value(BACKWARD_FRAME_BITS).map(|v| v as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_layout() {
        assert_eq!(ForwardFrame::broadcast(ALL_ON).raw(), 0xFF05);
        assert_eq!(ForwardFrame::broadcast(ALL_OFF).raw(), 0xFF06);
        assert_eq!(ForwardFrame::broadcast(0x00).raw(), 0xFF00);
    }

    #[test]
    fn test_turn_on_layout() {
        // Selector is the address shifted into bits 9..15, ORed with the
        // fixed turn-on opcode bits
        let frame = ForwardFrame::turn_on(ShortAddress::new(0x07).unwrap());
        assert_eq!(frame.raw(), (0x07 << 9) | 0x0105);
        assert_eq!(frame.raw(), 0x0F05);
    }

    #[test]
    fn test_turn_off_layout() {
        let frame = ForwardFrame::turn_off(ShortAddress::new(0x07).unwrap());
        assert_eq!(frame.raw(), 0x0F00);

        let frame = ForwardFrame::turn_off(ShortAddress::new(0).unwrap());
        assert_eq!(frame.raw(), 0x0100);
    }

    #[test]
    fn test_query_layouts() {
        let frame = ForwardFrame::query_device_type(ShortAddress::new(0x03).unwrap());
        assert_eq!(frame.raw(), (0x03 << 9) | 0x0199);

        assert_eq!(ForwardFrame::query_short_address().raw(), 0xBB00);
    }

    #[test]
    fn test_short_address_range() {
        assert!(ShortAddress::new(0).is_ok());
        assert!(ShortAddress::new(63).is_ok());

        let err = ShortAddress::new(64).unwrap_err();
        assert!(matches!(err, DaliBridgeError::InvalidAddress(64)));
    }

    #[test]
    fn test_forward_frame_bits() {
        let frame = ForwardFrame::from_raw(0x8001);
        assert!(frame.bit(15));
        assert!(frame.bit(0));
        assert!(!frame.bit(7));
    }

    #[test]
    fn test_backward_frame_accumulation() {
        let mut frame = BackwardFrame::default();
        assert!(frame.is_empty());

        // Start bit, then 8 data bits of 0xA5
        frame.push(true);
        for n in (0..8).rev() {
            frame.push((0xA5 >> n) & 1 == 1);
        }

        assert_eq!(frame.raw_bits(), 0x1A5);
        assert_eq!(frame.answer(), Some(0xA5));
    }

    #[test]
    fn test_backward_frame_partial_has_no_answer() {
        let mut frame = BackwardFrame::default();
        frame.push(true);
        frame.push(false);
        frame.push(true);

        assert!(!frame.is_empty());
        assert_eq!(frame.answer(), None);
    }

    #[test]
    fn test_backward_frame_overlong_has_no_answer() {
        let mut frame = BackwardFrame::default();
        for _ in 0..12 {
            frame.push(true);
        }
        assert_eq!(frame.answer(), None);
    }

    #[test]
    fn test_backward_frame_sixteen_bit_value() {
        let mut frame = BackwardFrame::default();
        frame.push(true);
        for n in (0..16).rev() {
            frame.push((0x0F05 >> n) & 1 == 1);
        }

        assert_eq!(frame.completed_value(16), Some(0x0F05));
        assert_eq!(frame.answer(), None);
    }

    #[test]
    fn test_line_level_helpers() {
        assert_eq!(LineLevel::Low.inverted(), LineLevel::High);
        assert_eq!(LineLevel::from_bit(true), LineLevel::High);
        assert_eq!(LineLevel::from_bit(false), LineLevel::Low);
        assert!(LineLevel::High.is_high());
    }
}
