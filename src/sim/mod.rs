//! # Bus Simulation Module
//!
//! Software model of the timer peripheral and the bus line.
//!
//! This module handles:
//! - A virtual-time implementation of [`TimerPeripheral`] (free-running
//!   counter, match channels, edge capture, line pins)
//! - A scriptable slave device that decodes the transmitted forward frame
//!   and answers with a Manchester backward frame
//! - Event-driven stepping so integration tests and the demo binary can run
//!   the real engine without hardware
//!
//! Virtual time only advances to the next scheduled event, so a full
//! transfer (tens of milliseconds of bus time) simulates in microseconds.

use crate::config::TimingConfig;
use crate::dali::decoder::decode_waveform;
use crate::dali::protocol::{LineLevel, BACKWARD_FRAME_BITS, FORWARD_FRAME_BITS};
use crate::engine::DaliMaster;
use crate::timer::{TimerEvent, TimerPeripheral};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::trace;

/// State of the simulated timer peripheral and bus line
struct SimTimerState {
    /// Virtual clock, microseconds since simulation start
    now_us: u64,
    running: bool,
    counter_us: u32,
    half_bit_period_us: Option<u32>,
    stop_period_us: Option<u32>,
    capture_enabled: bool,
    pending_half: bool,
    pending_stop: bool,
    pending_edge: bool,
    captured_us: u32,
    rx_level: LineLevel,
    tx_level: LineLevel,
    /// Transmit-line transitions of the current transfer
    tx_log: Vec<(u64, LineLevel)>,
    /// Incremented every time the counter is started (one start per transfer)
    start_seq: u64,
}

impl SimTimerState {
    fn new() -> Self {
        Self {
            now_us: 0,
            running: false,
            counter_us: 0,
            half_bit_period_us: None,
            stop_period_us: None,
            capture_enabled: false,
            pending_half: false,
            pending_stop: false,
            pending_edge: false,
            captured_us: 0,
            rx_level: LineLevel::High,
            tx_level: LineLevel::High,
            tx_log: Vec::new(),
            start_seq: 0,
        }
    }

    /// The transmit waveform as `(level, duration_us)` runs up to `now`
    fn tx_runs(&self) -> Vec<(LineLevel, u32)> {
        let mut runs = Vec::new();
        for window in self.tx_log.windows(2) {
            let (t0, level) = window[0];
            let (t1, _) = window[1];
            if t1 > t0 {
                runs.push((level, (t1 - t0) as u32));
            }
        }
        if let Some(&(t_last, level)) = self.tx_log.last() {
            if self.now_us > t_last {
                runs.push((level, (self.now_us - t_last) as u32));
            }
        }
        runs
    }
}

/// Handle implementing [`TimerPeripheral`] over the shared simulator state
#[derive(Clone)]
pub struct SimTimer {
    state: Arc<Mutex<SimTimerState>>,
}

impl TimerPeripheral for SimTimer {
    fn start(&mut self) {
        let mut st = self.state.lock().unwrap();
        st.running = true;
        st.start_seq += 1;
        let baseline = (st.now_us, st.tx_level);
        st.tx_log = vec![baseline];
    }

    fn stop(&mut self) {
        self.state.lock().unwrap().running = false;
    }

    fn restart_counter(&mut self) {
        self.state.lock().unwrap().counter_us = 0;
    }

    fn take_cause(&mut self) -> Option<TimerEvent> {
        let mut st = self.state.lock().unwrap();
        if st.pending_half {
            st.pending_half = false;
            Some(TimerEvent::HalfBitMatch)
        } else if st.pending_stop {
            st.pending_stop = false;
            Some(TimerEvent::StopMatch)
        } else if st.pending_edge {
            st.pending_edge = false;
            Some(TimerEvent::Edge)
        } else {
            None
        }
    }

    fn arm_half_bit_timer(&mut self, period_us: u32) {
        self.state.lock().unwrap().half_bit_period_us = Some(period_us);
    }

    fn arm_stop_timer(&mut self, period_us: u32) {
        self.state.lock().unwrap().stop_period_us = Some(period_us);
    }

    fn disarm_stop_timer(&mut self) {
        self.state.lock().unwrap().stop_period_us = None;
    }

    fn arm_capture(&mut self) {
        self.state.lock().unwrap().capture_enabled = true;
    }

    fn disarm_capture(&mut self) {
        let mut st = self.state.lock().unwrap();
        st.capture_enabled = false;
        st.pending_edge = false;
    }

    fn captured_interval_us(&self) -> u32 {
        self.state.lock().unwrap().captured_us
    }

    fn line_level(&self) -> LineLevel {
        self.state.lock().unwrap().rx_level
    }

    fn drive_line(&mut self, level: LineLevel) {
        let mut st = self.state.lock().unwrap();
        if st.tx_level != level {
            st.tx_level = level;
            // The master hears its own transmissions on the wired bus
            st.rx_level = level;
            let entry = (st.now_us, level);
            st.tx_log.push(entry);
        }
    }
}

/// Scriptable slave device
pub struct SimSlave {
    /// Quiet half-bit periods between the forward frame and the reply
    pub settle_half_bits: u32,
    responder: Box<dyn FnMut(u16) -> Option<u8> + Send>,
}

impl SimSlave {
    /// Slave that decides its answer from the decoded forward frame
    pub fn new(responder: impl FnMut(u16) -> Option<u8> + Send + 'static) -> Self {
        Self {
            settle_half_bits: 8,
            responder: Box::new(responder),
        }
    }

    /// Slave that never answers
    pub fn silent() -> Self {
        Self::new(|_| None)
    }
}

/// Event kinds the simulation can advance to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimEvent {
    HalfBitMatch,
    StopMatch,
    Edge,
}

/// Virtual DALI bus: the real engine wired to the simulated peripheral and
/// one slave device
pub struct SimBus {
    state: Arc<Mutex<SimTimerState>>,
    master: DaliMaster<SimTimer>,
    timing: TimingConfig,
    slave: SimSlave,
    /// Scheduled receive-line transitions `(absolute_us, level)`
    reply_edges: VecDeque<(u64, LineLevel)>,
    seen_start_seq: u64,
    reply_scheduled: bool,
}

impl SimBus {
    pub fn new(timing: TimingConfig, slave: SimSlave) -> Self {
        let state = Arc::new(Mutex::new(SimTimerState::new()));
        let timer = SimTimer {
            state: Arc::clone(&state),
        };
        let master = DaliMaster::new(timer, timing.clone());

        Self {
            state,
            master,
            timing,
            slave,
            reply_edges: VecDeque::new(),
            seen_start_seq: 0,
            reply_scheduled: false,
        }
    }

    /// A cloneable handle to the master driving this bus
    pub fn master(&self) -> DaliMaster<SimTimer> {
        self.master.clone()
    }

    /// The waveform the master transmitted during the current (or most
    /// recently completed) transfer
    pub fn last_tx_waveform(&self) -> Vec<(LineLevel, u32)> {
        self.state.lock().unwrap().tx_runs()
    }

    /// Advance virtual time to the next event and service it
    ///
    /// Returns `false` when nothing is scheduled (bus idle).
    pub fn step(&mut self) -> bool {
        self.sync_transfer_bookkeeping();
        self.maybe_schedule_reply();

        let Some((at_us, event)) = self.next_event() else {
            return false;
        };

        let interrupt = {
            let mut st = self.state.lock().unwrap();
            let dt = at_us.saturating_sub(st.now_us);
            st.now_us = at_us;
            if st.running {
                st.counter_us = st.counter_us.saturating_add(dt as u32);
            }

            match event {
                SimEvent::HalfBitMatch => {
                    st.pending_half = true;
                    true
                }
                SimEvent::StopMatch => {
                    st.pending_stop = true;
                    true
                }
                SimEvent::Edge => {
                    let (_, level) = self.reply_edges.pop_front().unwrap();
                    st.rx_level = level;
                    if st.capture_enabled {
                        st.captured_us = st.counter_us;
                        st.pending_edge = true;
                        true
                    } else {
                        false
                    }
                }
            }
        };

        if interrupt {
            self.master.on_interrupt();
        }
        true
    }

    /// Run the bus until the in-flight transfer completes
    pub fn run_until_idle(&mut self) {
        while self.master.is_busy() {
            if !self.step() {
                break;
            }
        }
    }

    /// Drive the bus from a dedicated thread until `shutdown` is set
    ///
    /// Steps through scheduled events and parks briefly while the bus is
    /// idle, so application tasks can await transfer outcomes.
    pub fn pump(mut self, shutdown: Arc<AtomicBool>) {
        while !shutdown.load(Ordering::Relaxed) {
            if !self.step() {
                std::thread::sleep(Duration::from_micros(200));
            }
        }
    }

    /// Reset per-transfer bookkeeping when the engine starts a new transfer
    fn sync_transfer_bookkeeping(&mut self) {
        let start_seq = self.state.lock().unwrap().start_seq;
        if start_seq != self.seen_start_seq {
            self.seen_start_seq = start_seq;
            self.reply_scheduled = false;
            self.reply_edges.clear();
        }
    }

    /// Once the master arms capture the forward frame is on the wire:
    /// decode it and let the slave decide whether to answer
    fn maybe_schedule_reply(&mut self) {
        if self.reply_scheduled || !self.master.is_busy() {
            return;
        }

        let (capture_enabled, runs, now_us) = {
            let st = self.state.lock().unwrap();
            (st.capture_enabled, st.tx_runs(), st.now_us)
        };
        if !capture_enabled {
            return;
        }
        self.reply_scheduled = true;

        let (frame, fault) = decode_waveform(&runs, &self.timing);
        let Some(forward) = frame.completed_value(FORWARD_FRAME_BITS) else {
            trace!("slave could not decode forward frame: {fault:?}");
            return;
        };

        if let Some(answer) = (self.slave.responder)(forward) {
            let start_us =
                now_us + (self.slave.settle_half_bits * self.timing.half_bit_us) as u64;
            self.schedule_backward_frame(start_us, answer);
            trace!("slave reply 0x{answer:02X} scheduled for frame 0x{forward:04X}");
        } else {
            trace!("slave stays silent for frame 0x{forward:04X}");
        }
    }

    /// Schedule the edges of a backward frame (start bit + 8 data bits)
    fn schedule_backward_frame(&mut self, start_us: u64, answer: u8) {
        let te = self.timing.half_bit_us as u64;

        // Half-bit levels: each bit drives !b then b
        let mut halves = Vec::with_capacity(2 + 2 * BACKWARD_FRAME_BITS as usize);
        for bit in std::iter::once(true)
            .chain((0..BACKWARD_FRAME_BITS).rev().map(|n| (answer >> n) & 1 == 1))
        {
            halves.push(LineLevel::from_bit(!bit));
            halves.push(LineLevel::from_bit(bit));
        }

        let mut level = LineLevel::High; // idle
        let mut t = start_us;
        for half in halves {
            if half != level {
                self.reply_edges.push_back((t, half));
                level = half;
            }
            t += te;
        }
        // Return to idle after the last half-bit
        if level != LineLevel::High {
            self.reply_edges.push_back((t, LineLevel::High));
        }
    }

    /// Earliest scheduled event; match channels win ties, as in hardware
    fn next_event(&self) -> Option<(u64, SimEvent)> {
        let st = self.state.lock().unwrap();
        let mut best: Option<(u64, SimEvent)> = None;

        let consider = |candidate: Option<(u64, SimEvent)>, best: &mut Option<(u64, SimEvent)>| {
            if let Some((t, _)) = candidate {
                match best {
                    Some((bt, _)) if *bt <= t => {}
                    _ => *best = candidate,
                }
            }
        };

        if st.running {
            consider(
                st.half_bit_period_us.map(|p| {
                    (st.now_us + p.saturating_sub(st.counter_us) as u64, SimEvent::HalfBitMatch)
                }),
                &mut best,
            );
            consider(
                st.stop_period_us.map(|p| {
                    (st.now_us + p.saturating_sub(st.counter_us) as u64, SimEvent::StopMatch)
                }),
                &mut best,
            );
        }
        consider(
            self.reply_edges.front().map(|&(t, _)| (t.max(st.now_us), SimEvent::Edge)),
            &mut best,
        );

        best
    }
}
