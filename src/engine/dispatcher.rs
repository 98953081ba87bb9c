//! # Timer/Edge Dispatcher
//!
//! The single interrupt entry point shared by the timer's match and capture
//! channels.
//!
//! Every entry restarts the free-running counter so all timing is measured
//! from the event just serviced, then demultiplexes on the interrupt cause:
//! half-bit matches clock the encoder while sending and double as the reply
//! watchdog while receiving; the stop-condition match closes a backward
//! frame; capture events feed the classifier/decoder. All protocol state
//! transitions happen serially inside this dispatcher.

use super::transfer::{TransferMonitor, TransferOutcome, TransferPhase};
use crate::config::TimingConfig;
use crate::dali::decoder::{BackwardDecoder, DecodeFault};
use crate::dali::encoder::half_bit_polarity;
use crate::dali::protocol::{ForwardFrame, LineLevel, SLOT_ARM_REPLY};
use crate::timer::{TimerEvent, TimerPeripheral};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// The send/receive engine driven by timer interrupts
///
/// Owns the peripheral and all per-transfer protocol state. Exactly one
/// instance exists per bus; the platform's interrupt entry delegates every
/// timer interrupt to [`TransferEngine::on_interrupt`].
pub struct TransferEngine<P: TimerPeripheral> {
    timer: P,
    timing: TimingConfig,
    monitor: Arc<TransferMonitor>,

    phase: TransferPhase,
    forward: ForwardFrame,
    decoder: BackwardDecoder,
    /// Captured high interval waiting for the next rising edge
    high_interval_us: u32,
    /// Set by the stop-condition match once the reply stream went quiet
    reply_complete: bool,
    fault: Option<DecodeFault>,
}

impl<P: TimerPeripheral> TransferEngine<P> {
    /// Build the engine and put the peripheral into the idle
    /// receive-monitoring configuration (capture and stop match armed,
    /// half-bit period TE, counter halted)
    pub fn new(mut timer: P, timing: TimingConfig, monitor: Arc<TransferMonitor>) -> Self {
        timer.stop();
        timer.arm_half_bit_timer(timing.half_bit_us);
        timer.arm_stop_timer(timing.stop_condition_us);
        timer.arm_capture();

        Self {
            timer,
            timing,
            monitor,
            phase: TransferPhase::Idle,
            forward: ForwardFrame::from_raw(0),
            decoder: BackwardDecoder::new(),
            high_interval_us: 0,
            reply_complete: false,
            fault: None,
        }
    }

    /// Current phase of the engine
    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    /// Begin emitting `frame`
    ///
    /// The caller must already hold the busy claim on the monitor; the
    /// engine must be idle. Drives the start-bit first half immediately;
    /// slot 0 follows one half-bit period later.
    pub(crate) fn start_transfer(&mut self, frame: ForwardFrame) {
        debug_assert_eq!(self.phase, TransferPhase::Idle);
        debug!("starting transfer of frame 0x{:04X}", frame.raw());

        self.forward = frame;
        self.decoder.reset();
        self.high_interval_us = 0;
        self.reply_complete = false;
        self.fault = None;

        // Send mode: only the half-bit clock may interrupt
        self.timer.disarm_capture();
        self.timer.disarm_stop_timer();
        self.timer.arm_half_bit_timer(self.timing.half_bit_us);
        self.timer.restart_counter();
        self.timer.start();
        self.timer.drive_line(LineLevel::Low);

        self.phase = TransferPhase::Sending { slot: 0 };
    }

    /// The shared interrupt service routine
    ///
    /// Restarts the counter so timing continues from the just-observed
    /// event, then services exactly one pending cause. Reading the cause
    /// clears the peripheral's interrupt flag.
    pub fn on_interrupt(&mut self) {
        self.timer.restart_counter();

        let Some(cause) = self.timer.take_cause() else {
            return;
        };

        match cause {
            TimerEvent::HalfBitMatch => self.on_half_bit(),
            TimerEvent::StopMatch => self.on_stop_condition(),
            TimerEvent::Edge => self.on_edge(),
        }
    }

    /// Half-bit clock while sending, reply watchdog while receiving
    fn on_half_bit(&mut self) {
        match self.phase {
            TransferPhase::Sending { slot } => {
                self.timer.drive_line(half_bit_polarity(self.forward, slot));

                if slot == SLOT_ARM_REPLY {
                    // Forward frame and settling done: the same match
                    // channel becomes the reply watchdog and the capture
                    // channel starts feeding the decoder
                    self.timer.arm_half_bit_timer(self.timing.reply_window_us);
                    self.timer.arm_capture();
                    self.phase = TransferPhase::Receiving;
                    trace!("forward frame sent, awaiting reply");
                } else {
                    self.phase = TransferPhase::Sending { slot: slot + 1 };
                }
            }

            // Watchdog expiry: the quiet window elapsed
            TransferPhase::Receiving => self.finish_transfer(),

            TransferPhase::Idle => {}
        }
    }

    /// Stop-condition match: the receive line has been quiet for two full
    /// bit periods
    fn on_stop_condition(&mut self) {
        // One-shot: left armed it would retrigger every stop period and,
        // since every entry restarts the counter, hold off the watchdog
        // forever. The next reply edge re-arms it.
        self.timer.disarm_stop_timer();

        if self.phase == TransferPhase::Receiving && self.decoder.is_started() {
            self.reply_complete = true;
            trace!(
                "backward frame closed with bits 0x{:X}",
                self.decoder.frame().raw_bits()
            );
        }
    }

    /// Captured edge on the receive line
    fn on_edge(&mut self) {
        let interval_us = self.timer.captured_interval_us();

        if self.phase != TransferPhase::Receiving {
            trace!("edge outside transfer ignored ({interval_us}us)");
            return;
        }

        match self.timer.line_level() {
            // Rising edge: the captured interval is the low time
            LineLevel::High => {
                if self.decoder.is_started() {
                    if let Err(fault) =
                        self.decoder
                            .rising_edge(interval_us, self.high_interval_us, &self.timing)
                    {
                        warn!(
                            "backward frame discarded ({}): low {}us, high {}us",
                            fault, interval_us, self.high_interval_us
                        );
                        self.fault = Some(fault);
                    }
                } else {
                    // First edge pair of the reply: seed the start bit and
                    // start watching for the end-of-frame quiet window
                    self.decoder.seed();
                    self.timer.arm_stop_timer(self.timing.stop_condition_us);
                    trace!("backward frame started");
                }
            }

            // Falling edge: remember the high time for the next rising edge
            LineLevel::Low => self.high_interval_us = interval_us,
        }
    }

    /// End of transfer: restore idle monitoring and publish the outcome
    fn finish_transfer(&mut self) {
        self.timer.stop();
        self.timer.arm_half_bit_timer(self.timing.half_bit_us);
        self.timer.arm_stop_timer(self.timing.stop_condition_us);
        self.timer.arm_capture();

        // The answer is only meaningful if the end-of-frame detector closed
        // the backward frame and the marker sits exactly above 8 data bits
        let answer = if self.reply_complete {
            self.decoder.frame().answer()
        } else {
            None
        };

        let outcome = TransferOutcome {
            forward: self.forward,
            answer,
            fault: self.fault,
        };

        self.decoder.reset();
        self.reply_complete = false;
        self.high_interval_us = 0;
        self.phase = TransferPhase::Idle;

        debug!(
            "transfer of frame 0x{:04X} complete: answer {:?}, fault {:?}",
            outcome.forward.raw(),
            outcome.answer,
            outcome.fault
        );

        self.monitor.publish(outcome);
    }
}
