//! # Transfer Engine Module
//!
//! The interrupt-driven send/receive engine and its command API.
//!
//! This module handles:
//! - The shared-interrupt dispatcher state machine ([`TransferEngine`])
//! - Cross-context publication of transfer results ([`TransferMonitor`])
//! - The non-blocking command API ([`DaliMaster`] / [`TransferHandle`])

pub mod dispatcher;
pub mod master;
pub mod transfer;

pub use dispatcher::TransferEngine;
pub use master::{DaliMaster, TransferHandle};
pub use transfer::{TransferMonitor, TransferOutcome, TransferPhase};
