//! # Forward-Frame Encoder
//!
//! Manchester encoding of a 16-bit forward frame into half-bit line
//! polarities.
//!
//! A forward frame occupies 46 half-bit periods on the wire: the start-bit
//! first half (driven low when the transfer starts), then 45 encoder slots —
//! the start-bit second half, 32 data half-bits MSB-first, and the stop
//! condition with its settling window. Each data bit drives `!b` in its
//! first half and `b` in its second half, so a bit's value is the level
//! after its mid-bit transition (rising edge at mid-bit = 1).

use super::protocol::{ForwardFrame, LineLevel, FORWARD_FRAME_BITS, HALF_BIT_SLOTS};
use crate::config::TimingConfig;

/// Line polarity to drive for encoder slot `slot` in `[0, 45)`
///
/// # Arguments
///
/// * `frame` - The forward frame being transmitted
/// * `slot` - Half-bit slot index; slots at and past the stop condition
///   (and out-of-range values) drive the idle-high level
///
/// # Returns
///
/// * `LineLevel` - The polarity for that half-period
pub fn half_bit_polarity(frame: ForwardFrame, slot: u8) -> LineLevel {
    match slot {
        // Second half of the start bit
        0 => LineLevel::High,

        // 16 data bits MSB-first, two half-periods per bit
        1..=32 => {
            let bit = frame.bit(FORWARD_FRAME_BITS - (slot as u32 + 1) / 2);
            if slot % 2 == 1 {
                // First half of a data bit carries the inverted value
                LineLevel::from_bit(!bit)
            } else {
                LineLevel::from_bit(bit)
            }
        }

        // Stop condition and settling: line held at idle
        _ => LineLevel::High,
    }
}

/// Render the complete electrical waveform of a forward frame
///
/// Produces `(level, duration_us)` runs, adjacent equal levels merged,
/// starting with the start-bit first half and ending with the stop/settling
/// window. Used by the bus simulation and the waveform-level round-trip
/// tests.
pub fn render_waveform(frame: ForwardFrame, timing: &TimingConfig) -> Vec<(LineLevel, u32)> {
    let te = timing.half_bit_us;

    // Start-bit first half is driven at transfer start, before slot 0
    let mut runs: Vec<(LineLevel, u32)> = vec![(LineLevel::Low, te)];

    for slot in 0..HALF_BIT_SLOTS {
        let level = half_bit_polarity(frame, slot);
        match runs.last_mut() {
            Some(last) if last.0 == level => last.1 += te,
            _ => runs.push((level, te)),
        }
    }

    runs
}
