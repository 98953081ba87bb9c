//! # Transfer State
//!
//! The authoritative record of where the engine is in a send/receive cycle,
//! and the cross-context hand-off of its result.
//!
//! Roles are fixed: the dispatcher is the only writer of phase and outcome
//! during a transfer; callers claim the busy flag before a transfer and
//! read the outcome snapshot after completion is signalled. Every field
//! that crosses the interrupt/application boundary is atomic or
//! mutex-protected.

use crate::dali::decoder::DecodeFault;
use crate::dali::protocol::ForwardFrame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Where the engine is within one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    /// Receive-monitoring configuration armed, counter halted
    Idle,
    /// Emitting forward-frame half-bits; `slot` is the next encoder slot
    Sending { slot: u8 },
    /// Forward frame out, reply watchdog armed, capture feeding the decoder
    Receiving,
}

/// Result of one completed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    /// The forward frame that was transmitted
    pub forward: ForwardFrame,
    /// Answer byte of a completed backward frame, `None` for "no reply"
    pub answer: Option<u8>,
    /// Last decode fault observed while receiving, if any
    pub fault: Option<DecodeFault>,
}

impl TransferOutcome {
    /// Whether a valid backward frame was received
    pub fn has_reply(&self) -> bool {
        self.answer.is_some()
    }
}

/// Cross-context publication of transfer completion
///
/// Single producer (the dispatcher, from interrupt context), multiple
/// consumers (callers polling or awaiting). The busy flag is claimed with a
/// compare-exchange before a transfer starts and released with a store
/// after the outcome snapshot is in place, so a reader that observes
/// `!busy` always sees the matching outcome.
#[derive(Debug, Default)]
pub struct TransferMonitor {
    busy: AtomicBool,
    outcome: Mutex<Option<TransferOutcome>>,
    completed: Notify,
}

impl TransferMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a transfer is currently in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Atomically claim the bus for a new transfer
    ///
    /// Returns `false` if a transfer is already in flight.
    pub(crate) fn try_claim(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Drop the previous outcome so a fresh transfer can never surface
    /// stale data
    pub(crate) fn clear_pending(&self) {
        *self.outcome.lock().unwrap() = None;
    }

    /// Publish the outcome, release the busy flag and wake waiters
    pub(crate) fn publish(&self, outcome: TransferOutcome) {
        *self.outcome.lock().unwrap() = Some(outcome);
        self.busy.store(false, Ordering::Release);
        self.completed.notify_waiters();
    }

    /// Outcome of the most recently completed transfer, if one has
    /// completed since the last transfer started
    pub fn latest(&self) -> Option<TransferOutcome> {
        *self.outcome.lock().unwrap()
    }

    /// Wait for the in-flight transfer to complete
    pub async fn wait(&self) -> TransferOutcome {
        loop {
            // Register for the wake-up before checking, so a publish
            // between the check and the await cannot be missed
            let completed = self.completed.notified();
            if let Some(outcome) = self.latest() {
                return outcome;
            }
            completed.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn outcome(answer: Option<u8>) -> TransferOutcome {
        TransferOutcome {
            forward: ForwardFrame::broadcast(0x05),
            answer,
            fault: None,
        }
    }

    #[test]
    fn test_claim_is_exclusive() {
        let monitor = TransferMonitor::new();

        assert!(monitor.try_claim());
        assert!(monitor.is_busy());
        assert!(!monitor.try_claim());

        monitor.publish(outcome(None));
        assert!(!monitor.is_busy());
        assert!(monitor.try_claim());
    }

    #[test]
    fn test_clear_pending_prevents_stale_reads() {
        let monitor = TransferMonitor::new();
        monitor.publish(outcome(Some(0x42)));
        assert!(monitor.latest().is_some());

        assert!(monitor.try_claim());
        monitor.clear_pending();
        assert_eq!(monitor.latest(), None);
    }

    #[test]
    fn test_publish_exposes_answer() {
        let monitor = TransferMonitor::new();
        assert!(monitor.try_claim());
        monitor.clear_pending();

        monitor.publish(outcome(Some(0xA5)));

        let latest = monitor.latest().unwrap();
        assert!(latest.has_reply());
        assert_eq!(latest.answer, Some(0xA5));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_publish() {
        let monitor = Arc::new(TransferMonitor::new());
        assert!(monitor.try_claim());
        monitor.clear_pending();

        let publisher = Arc::clone(&monitor);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish(outcome(Some(0x07)));
        });

        let result = monitor.wait().await;
        assert_eq!(result.answer, Some(0x07));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_complete() {
        let monitor = TransferMonitor::new();
        monitor.publish(outcome(None));

        let result = monitor.wait().await;
        assert!(!result.has_reply());
    }
}
