//! # Error Types
//!
//! Custom error types for DALI Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for DALI Bridge
#[derive(Debug, Error)]
pub enum DaliBridgeError {
    /// A transfer is already in flight on the bus
    #[error("DALI bus is busy with another transfer")]
    BusBusy,

    /// Short address outside the 6-bit range
    #[error("invalid short address {0}: must be 0..=63")]
    InvalidAddress(u8),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for DALI Bridge
pub type Result<T> = std::result::Result<T, DaliBridgeError>;
