//! Trait abstraction for the shared timer/line peripheral to enable testing

use crate::dali::protocol::LineLevel;

/// Interrupt cause reported by the peripheral
///
/// One hardware interrupt line is shared by the timer's match and capture
/// channels; the dispatcher demultiplexes on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// The half-bit clock match fired (doubles as the reply watchdog while
    /// receiving)
    HalfBitMatch,
    /// The stop-condition match fired
    StopMatch,
    /// The capture channel latched an edge on the receive line
    Edge,
}

/// Operations the engine needs from the timer peripheral and the bus pins
pub trait TimerPeripheral: Send {
    /// Let the free-running counter run
    fn start(&mut self);

    /// Halt the free-running counter
    fn stop(&mut self);

    /// Reset the counter to zero so timing restarts from the event being
    /// serviced
    fn restart_counter(&mut self);

    /// Read and clear the highest-priority pending interrupt cause
    fn take_cause(&mut self) -> Option<TimerEvent>;

    /// Program the half-bit match channel to fire every `period_us`
    fn arm_half_bit_timer(&mut self, period_us: u32);

    /// Program the stop-condition match channel to fire after `period_us`
    fn arm_stop_timer(&mut self, period_us: u32);

    /// Disable the stop-condition match channel
    fn disarm_stop_timer(&mut self);

    /// Enable edge capture on both edges of the receive line
    fn arm_capture(&mut self);

    /// Disable edge capture
    fn disarm_capture(&mut self);

    /// Counter value latched by the most recent captured edge
    fn captured_interval_us(&self) -> u32;

    /// Current level of the receive line
    fn line_level(&self) -> LineLevel;

    /// Drive the transmit line
    fn drive_line(&mut self, level: LineLevel);
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Operations recorded by the scripted timer
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TimerOp {
        Start,
        Stop,
        ArmHalfBit(u32),
        ArmStop(u32),
        DisarmStop,
        ArmCapture,
        DisarmCapture,
        Drive(LineLevel),
    }

    /// Scripted timer peripheral for dispatcher tests
    ///
    /// Tests queue interrupt causes and captured intervals, call the
    /// dispatcher, and inspect the recorded operations afterwards.
    #[derive(Clone)]
    pub struct ScriptedTimer {
        pub inner: Arc<Mutex<ScriptedTimerState>>,
    }

    pub struct ScriptedTimerState {
        pub ops: Vec<TimerOp>,
        pub causes: VecDeque<TimerEvent>,
        pub captured_us: u32,
        pub rx_level: LineLevel,
        pub tx_levels: Vec<LineLevel>,
        pub counter_resets: usize,
    }

    impl Default for ScriptedTimerState {
        fn default() -> Self {
            Self {
                ops: Vec::new(),
                causes: VecDeque::new(),
                captured_us: 0,
                rx_level: LineLevel::High,
                tx_levels: Vec::new(),
                counter_resets: 0,
            }
        }
    }

    impl ScriptedTimer {
        pub fn new() -> Self {
            Self {
                inner: Arc::new(Mutex::new(ScriptedTimerState::default())),
            }
        }

        pub fn push_cause(&self, cause: TimerEvent) {
            self.inner.lock().unwrap().causes.push_back(cause);
        }

        pub fn set_edge(&self, level: LineLevel, interval_us: u32) {
            let mut state = self.inner.lock().unwrap();
            state.rx_level = level;
            state.captured_us = interval_us;
            state.causes.push_back(TimerEvent::Edge);
        }

        pub fn ops(&self) -> Vec<TimerOp> {
            self.inner.lock().unwrap().ops.clone()
        }

        pub fn driven_levels(&self) -> Vec<LineLevel> {
            self.inner.lock().unwrap().tx_levels.clone()
        }
    }

    impl TimerPeripheral for ScriptedTimer {
        fn start(&mut self) {
            self.inner.lock().unwrap().ops.push(TimerOp::Start);
        }

        fn stop(&mut self) {
            self.inner.lock().unwrap().ops.push(TimerOp::Stop);
        }

        fn restart_counter(&mut self) {
            self.inner.lock().unwrap().counter_resets += 1;
        }

        fn take_cause(&mut self) -> Option<TimerEvent> {
            self.inner.lock().unwrap().causes.pop_front()
        }

        fn arm_half_bit_timer(&mut self, period_us: u32) {
            self.inner.lock().unwrap().ops.push(TimerOp::ArmHalfBit(period_us));
        }

        fn arm_stop_timer(&mut self, period_us: u32) {
            self.inner.lock().unwrap().ops.push(TimerOp::ArmStop(period_us));
        }

        fn disarm_stop_timer(&mut self) {
            self.inner.lock().unwrap().ops.push(TimerOp::DisarmStop);
        }

        fn arm_capture(&mut self) {
            self.inner.lock().unwrap().ops.push(TimerOp::ArmCapture);
        }

        fn disarm_capture(&mut self) {
            self.inner.lock().unwrap().ops.push(TimerOp::DisarmCapture);
        }

        fn captured_interval_us(&self) -> u32 {
            self.inner.lock().unwrap().captured_us
        }

        fn line_level(&self) -> LineLevel {
            self.inner.lock().unwrap().rx_level
        }

        fn drive_line(&mut self, level: LineLevel) {
            let mut state = self.inner.lock().unwrap();
            state.ops.push(TimerOp::Drive(level));
            state.tx_levels.push(level);
        }
    }
}
