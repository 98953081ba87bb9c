//! # Backward-Frame Decoder
//!
//! Reassembles reply bits from captured edge intervals.
//!
//! The capture channel timestamps both edges of the receive line. Each
//! rising edge closes a `(high interval, low interval)` pair; classifying
//! both against the calibrated windows and combining them with the previous
//! half-bit value selects one action from a fixed truth table:
//!
//! ```text
//!     previous | low  | high | action
//!    ----------+------+------+----------------------
//!        0     | short| short| shift 0
//!        0     | short| long | error
//!        0     | long | short| shift 0, shift 1; previous <- 1
//!        0     | long | long | error
//!        1     | short| short| shift 1
//!        1     | short| long | shift 0; previous <- 0
//!        1     | long | short| error
//!        1     | long | long | shift 0, shift 1
//! ```
//!
//! An interval outside both windows discards the frame immediately, with
//! the offending interval recorded so "bad high" and "bad low" stay
//! distinguishable.

use super::protocol::{BackwardFrame, LineLevel};
use crate::config::TimingConfig;
use thiserror::Error;

/// Classification of a captured edge interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalClass {
    /// One half-bit period
    Short,
    /// One full bit period
    Long,
    /// Outside both calibration windows
    Invalid,
}

/// Classify a measured interval against the calibrated timing windows
///
/// Both windows are open: a value sitting exactly on a bound is `Invalid`.
pub fn classify(interval_us: u32, timing: &TimingConfig) -> IntervalClass {
    if interval_us > timing.min_half_bit_us && interval_us < timing.max_half_bit_us {
        IntervalClass::Short
    } else if interval_us > timing.min_full_bit_us && interval_us < timing.max_full_bit_us {
        IntervalClass::Long
    } else {
        IntervalClass::Invalid
    }
}

/// Why a backward frame was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeFault {
    /// The high interval preceding a rising edge failed classification
    #[error("high interval outside timing windows")]
    BadHighInterval,

    /// The low interval preceding a rising edge failed classification
    #[error("low interval outside timing windows")]
    BadLowInterval,

    /// Both intervals classified but the combination is impossible for a
    /// Manchester stream (truth-table error rows)
    #[error("invalid half-bit sequence")]
    InvalidSequence,
}

/// Stateful truth-table decoder for one backward frame
#[derive(Debug, Default)]
pub struct BackwardDecoder {
    previous: bool,
    frame: BackwardFrame,
}

impl BackwardDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the frame and the previous half-bit value
    pub fn reset(&mut self) {
        self.previous = false;
        self.frame.reset();
    }

    /// Whether any bits (at least the start bit) have been shifted in
    pub fn is_started(&self) -> bool {
        !self.frame.is_empty()
    }

    /// The accumulated frame
    pub fn frame(&self) -> BackwardFrame {
        self.frame
    }

    /// First rising edge of a reply: shift the start bit and prime the
    /// previous half-bit value
    pub fn seed(&mut self) {
        self.previous = true;
        self.frame.push(true);
    }

    /// Decode the interval pair closed by a rising edge
    ///
    /// # Arguments
    ///
    /// * `low_us` - Duration the line was low before this rising edge
    /// * `high_us` - Duration the line was high before that low period
    ///
    /// # Errors
    ///
    /// On any fault the frame is discarded and the fault returned; the
    /// decoder may be reseeded by a later edge.
    pub fn rising_edge(
        &mut self,
        low_us: u32,
        high_us: u32,
        timing: &TimingConfig,
    ) -> Result<(), DecodeFault> {
        // High interval checked first, matching the capture order on the wire
        let high = match classify(high_us, timing) {
            IntervalClass::Invalid => return self.discard(DecodeFault::BadHighInterval),
            class => class,
        };
        let low = match classify(low_us, timing) {
            IntervalClass::Invalid => return self.discard(DecodeFault::BadLowInterval),
            class => class,
        };

        use IntervalClass::{Invalid, Long, Short};
        match (self.previous, low, high) {
            (false, Short, Short) => self.frame.push(false),
            (false, Short, Long) => return self.discard(DecodeFault::InvalidSequence),
            (false, Long, Short) => {
                self.frame.push(false);
                self.frame.push(true);
                self.previous = true;
            }
            (false, Long, Long) => return self.discard(DecodeFault::InvalidSequence),
            (true, Short, Short) => self.frame.push(true),
            (true, Short, Long) => {
                self.frame.push(false);
                self.previous = false;
            }
            (true, Long, Short) => return self.discard(DecodeFault::InvalidSequence),
            (true, Long, Long) => {
                self.frame.push(false);
                self.frame.push(true);
            }
            (_, Invalid, _) | (_, _, Invalid) => unreachable!("filtered above"),
        }

        Ok(())
    }

    fn discard(&mut self, fault: DecodeFault) -> Result<(), DecodeFault> {
        self.frame.reset();
        Err(fault)
    }
}

/// Decode a recorded waveform offline
///
/// Walks `(level, duration_us)` runs the way the dispatcher walks live
/// captures: every low run ends in a rising edge (a final low run is closed
/// by the return to the idle-high line). Returns the accumulated frame and
/// the last fault, if any.
///
/// Used by the bus simulation to read back transmitted forward frames and
/// by the waveform-level round-trip tests.
pub fn decode_waveform(
    runs: &[(LineLevel, u32)],
    timing: &TimingConfig,
) -> (BackwardFrame, Option<DecodeFault>) {
    let mut decoder = BackwardDecoder::new();
    let mut fault = None;
    let mut last_high_us = 0u32;

    for &(level, duration_us) in runs {
        if duration_us == 0 {
            continue;
        }
        match level {
            LineLevel::High => last_high_us = duration_us,
            LineLevel::Low => {
                if !decoder.is_started() {
                    decoder.seed();
                } else if let Err(f) = decoder.rising_edge(duration_us, last_high_us, timing) {
                    fault = Some(f);
                }
            }
        }
    }

    (decoder.frame(), fault)
}
