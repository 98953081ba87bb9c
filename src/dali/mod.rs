//! # DALI Protocol Module
//!
//! Bit-level implementation of the DALI forward/backward frame format.
//!
//! This module handles:
//! - Forward frame construction (broadcast, addressed, query layouts)
//! - Manchester encoding of a forward frame into half-bit line polarities
//! - Edge-interval classification against the calibrated timing windows
//! - Truth-table reassembly of backward frames from classified intervals

pub mod protocol;
pub mod encoder;
pub mod decoder;
