//! # DALI Master
//!
//! The public command API over the transfer engine.
//!
//! `DaliMaster` owns the engine behind a mutex and shares the transfer
//! monitor with every caller. Starting a command is non-blocking: it either
//! claims the bus and returns a [`TransferHandle`], or fails fast with
//! [`DaliBridgeError::BusBusy`] — it never spins waiting for the line.
//!
//! The platform's interrupt entry delegates to [`DaliMaster::on_interrupt`];
//! the instance is long-lived and cloneable, so the delegate can be a fixed
//! reference injected at initialization instead of a mutable global.

use super::dispatcher::TransferEngine;
use super::transfer::{TransferMonitor, TransferOutcome};
use crate::config::TimingConfig;
use crate::dali::protocol::{ForwardFrame, ShortAddress};
use crate::error::{DaliBridgeError, Result};
use crate::timer::TimerPeripheral;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Master-side driver handle for one DALI bus
///
/// # Examples
///
/// ```no_run
/// use dali_bridge::config::TimingConfig;
/// use dali_bridge::sim::{SimBus, SimSlave};
///
/// let mut bus = SimBus::new(TimingConfig::default(), SimSlave::silent());
/// let master = bus.master();
///
/// let handle = master.broadcast(0x05)?;
/// bus.run_until_idle();
/// assert!(handle.try_outcome().is_some());
/// # Ok::<(), dali_bridge::error::DaliBridgeError>(())
/// ```
pub struct DaliMaster<P: TimerPeripheral> {
    engine: Arc<Mutex<TransferEngine<P>>>,
    monitor: Arc<TransferMonitor>,
}

impl<P: TimerPeripheral> Clone for DaliMaster<P> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            monitor: Arc::clone(&self.monitor),
        }
    }
}

impl<P: TimerPeripheral> std::fmt::Debug for DaliMaster<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaliMaster")
            .field("busy", &self.monitor.is_busy())
            .finish_non_exhaustive()
    }
}

impl<P: TimerPeripheral> DaliMaster<P> {
    /// Build a master over the given timer peripheral
    ///
    /// Puts the peripheral into the idle receive-monitoring configuration.
    pub fn new(timer: P, timing: TimingConfig) -> Self {
        let monitor = Arc::new(TransferMonitor::new());
        let engine = TransferEngine::new(timer, timing, Arc::clone(&monitor));

        Self {
            engine: Arc::new(Mutex::new(engine)),
            monitor,
        }
    }

    /// Interrupt delegate: service one timer match/capture event
    ///
    /// Wire this to the platform's timer interrupt vector (or, in
    /// simulation, call it whenever the software timer raises an event).
    pub fn on_interrupt(&self) {
        self.engine.lock().unwrap().on_interrupt();
    }

    /// Whether a transfer is currently in flight
    pub fn is_busy(&self) -> bool {
        self.monitor.is_busy()
    }

    /// The shared transfer monitor
    pub fn monitor(&self) -> Arc<TransferMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Start transmitting a raw forward frame
    ///
    /// # Returns
    ///
    /// * `Result<TransferHandle>` - Handle to poll or await the outcome
    ///
    /// # Errors
    ///
    /// Returns [`DaliBridgeError::BusBusy`] if a transfer is in flight;
    /// the in-flight transfer is left untouched.
    pub fn send_frame(&self, frame: ForwardFrame) -> Result<TransferHandle> {
        if !self.monitor.try_claim() {
            debug!("bus busy, rejecting frame 0x{:04X}", frame.raw());
            return Err(DaliBridgeError::BusBusy);
        }

        self.monitor.clear_pending();
        self.engine.lock().unwrap().start_transfer(frame);

        Ok(TransferHandle {
            monitor: Arc::clone(&self.monitor),
        })
    }

    /// Broadcast `command` to every device on the bus
    pub fn broadcast(&self, command: u8) -> Result<TransferHandle> {
        self.send_frame(ForwardFrame::broadcast(command))
    }

    /// Turn the addressed device on
    pub fn turn_on(&self, address: u8) -> Result<TransferHandle> {
        self.send_frame(ForwardFrame::turn_on(ShortAddress::new(address)?))
    }

    /// Turn the addressed device off
    pub fn turn_off(&self, address: u8) -> Result<TransferHandle> {
        self.send_frame(ForwardFrame::turn_off(ShortAddress::new(address)?))
    }

    /// Query the addressed device for its device type
    pub fn query_device_type(&self, address: u8) -> Result<TransferHandle> {
        self.send_frame(ForwardFrame::query_device_type(ShortAddress::new(address)?))
    }

    /// Query an unaddressed device for its programmed short address
    pub fn query_short_address(&self) -> Result<TransferHandle> {
        self.send_frame(ForwardFrame::query_short_address())
    }
}

/// Handle to one started transfer
///
/// The transfer runs entirely in interrupt context; the handle only
/// observes completion.
#[derive(Debug)]
pub struct TransferHandle {
    monitor: Arc<TransferMonitor>,
}

impl TransferHandle {
    /// Non-blocking poll: the outcome once the transfer has completed
    pub fn try_outcome(&self) -> Option<TransferOutcome> {
        self.monitor.latest()
    }

    /// Wait for the transfer to complete
    pub async fn outcome(self) -> TransferOutcome {
        self.monitor.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::peripheral::mocks::ScriptedTimer;
    use crate::timer::TimerEvent;
    use crate::dali::protocol::HALF_BIT_SLOTS;

    fn master() -> (DaliMaster<ScriptedTimer>, ScriptedTimer) {
        let timer = ScriptedTimer::new();
        let master = DaliMaster::new(timer.clone(), TimingConfig::default());
        (master, timer)
    }

    fn run_to_completion(master: &DaliMaster<ScriptedTimer>, timer: &ScriptedTimer) {
        for _ in 0..HALF_BIT_SLOTS {
            timer.push_cause(TimerEvent::HalfBitMatch);
            master.on_interrupt();
        }
        // Watchdog
        timer.push_cause(TimerEvent::HalfBitMatch);
        master.on_interrupt();
    }

    #[test]
    fn test_second_start_while_busy_is_rejected() {
        let (master, _timer) = master();

        let _handle = master.broadcast(0x05).unwrap();
        assert!(master.is_busy());

        let err = master.broadcast(0x06).unwrap_err();
        assert!(matches!(err, DaliBridgeError::BusBusy));
    }

    #[test]
    fn test_bus_reusable_after_completion() {
        let (master, timer) = master();

        let handle = master.turn_on(7).unwrap();
        run_to_completion(&master, &timer);

        let outcome = handle.try_outcome().unwrap();
        assert_eq!(outcome.forward.raw(), 0x0F05);
        assert!(!outcome.has_reply());

        assert!(!master.is_busy());
        assert!(master.turn_off(7).is_ok());
    }

    #[test]
    fn test_invalid_address_rejected_without_claiming() {
        let (master, _timer) = master();

        assert!(matches!(
            master.turn_on(64),
            Err(DaliBridgeError::InvalidAddress(64))
        ));
        assert!(!master.is_busy());
    }

    #[test]
    fn test_try_outcome_is_none_while_in_flight() {
        let (master, _timer) = master();

        let handle = master.query_short_address().unwrap();
        assert_eq!(handle.try_outcome(), None);
    }

    #[tokio::test]
    async fn test_outcome_await_completes() {
        let (master, timer) = master();

        let handle = master.broadcast(0x05).unwrap();

        let driver = master.clone();
        let worker = tokio::task::spawn_blocking(move || {
            run_to_completion(&driver, &timer);
        });

        let outcome = handle.outcome().await;
        assert_eq!(outcome.forward.raw(), 0xFF05);
        worker.await.unwrap();
    }
}
