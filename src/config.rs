//! # Configuration Module
//!
//! Handles loading and validating timing calibration from TOML files.
//!
//! The defaults are the IEC 62386 timing constants the driver was calibrated
//! against; a config file only needs to list the values it overrides.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Bus timing calibration
///
/// All values are in microseconds. The classifier windows are open on both
/// ends: an interval must be strictly inside (`min`, `max`) to classify.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    /// Half-bit period TE
    #[serde(default = "default_half_bit_us")]
    pub half_bit_us: u32,

    /// Lower bound of the half-bit classification window
    #[serde(default = "default_min_half_bit_us")]
    pub min_half_bit_us: u32,

    /// Upper bound of the half-bit classification window
    #[serde(default = "default_max_half_bit_us")]
    pub max_half_bit_us: u32,

    /// Lower bound of the full-bit classification window
    #[serde(default = "default_min_full_bit_us")]
    pub min_full_bit_us: u32,

    /// Upper bound of the full-bit classification window
    #[serde(default = "default_max_full_bit_us")]
    pub max_full_bit_us: u32,

    /// Quiet time after the last edge that marks the end of a backward frame
    /// (two stop-bit periods)
    #[serde(default = "default_stop_condition_us")]
    pub stop_condition_us: u32,

    /// Reply watchdog: quiet time after the forward frame (or after the last
    /// bus event) before the transfer is closed out (22 half-bits)
    #[serde(default = "default_reply_window_us")]
    pub reply_window_us: u32,
}

// Default value functions
fn default_half_bit_us() -> u32 { 417 }
fn default_min_half_bit_us() -> u32 { 350 }
fn default_max_half_bit_us() -> u32 { 490 }
fn default_min_full_bit_us() -> u32 { 760 }
fn default_max_full_bit_us() -> u32 { 900 }
fn default_stop_condition_us() -> u32 { 1800 }
fn default_reply_window_us() -> u32 { 9174 }

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            half_bit_us: default_half_bit_us(),
            min_half_bit_us: default_min_half_bit_us(),
            max_half_bit_us: default_max_half_bit_us(),
            min_full_bit_us: default_min_full_bit_us(),
            max_full_bit_us: default_max_full_bit_us(),
            stop_condition_us: default_stop_condition_us(),
            reply_window_us: default_reply_window_us(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dali_bridge::config::Config;
    ///
    /// let config = Config::load("config/dali-bridge.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any timing value is zero, the classification windows
    /// overlap, or the nominal half-bit period falls outside its own window.
    fn validate(&self) -> Result<()> {
        self.timing.validate()
    }
}

impl TimingConfig {
    fn validate(&self) -> Result<()> {
        fn invalid(msg: &str) -> crate::error::DaliBridgeError {
            crate::error::DaliBridgeError::Config(toml::de::Error::custom(msg))
        }

        if self.half_bit_us == 0 {
            return Err(invalid("half_bit_us cannot be zero"));
        }
        if self.min_half_bit_us >= self.max_half_bit_us {
            return Err(invalid("half-bit window is empty (min >= max)"));
        }
        if self.min_full_bit_us >= self.max_full_bit_us {
            return Err(invalid("full-bit window is empty (min >= max)"));
        }
        // Windows must not overlap or an interval could classify both ways
        if self.max_half_bit_us > self.min_full_bit_us {
            return Err(invalid("half-bit and full-bit windows overlap"));
        }
        if !(self.min_half_bit_us < self.half_bit_us && self.half_bit_us < self.max_half_bit_us) {
            return Err(invalid("half_bit_us must sit inside the half-bit window"));
        }
        if self.stop_condition_us < self.max_full_bit_us {
            return Err(invalid(
                "stop_condition_us must exceed the longest valid bit interval",
            ));
        }
        if self.reply_window_us < self.stop_condition_us {
            return Err(invalid("reply_window_us must exceed stop_condition_us"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_timing_matches_calibration() {
        let timing = TimingConfig::default();
        assert_eq!(timing.half_bit_us, 417);
        assert_eq!(timing.min_half_bit_us, 350);
        assert_eq!(timing.max_half_bit_us, 490);
        assert_eq!(timing.min_full_bit_us, 760);
        assert_eq!(timing.max_full_bit_us, 900);
        assert_eq!(timing.stop_condition_us, 1800);
        assert_eq!(timing.reply_window_us, 9174);
    }

    #[test]
    fn test_reply_window_is_22_half_bits() {
        let timing = TimingConfig::default();
        assert_eq!(timing.reply_window_us, 22 * timing.half_bit_us);
    }

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.timing, TimingConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_single_field() {
        let config: Config = toml::from_str(
            r#"
            [timing]
            reply_window_us = 10000
            "#,
        )
        .unwrap();

        assert_eq!(config.timing.reply_window_us, 10000);
        assert_eq!(config.timing.half_bit_us, 417);
    }

    #[test]
    fn test_overlapping_windows_rejected() {
        let mut config = Config::default();
        config.timing.max_half_bit_us = 800; // overlaps min_full_bit_us = 760
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_window_rejected() {
        let mut config = Config::default();
        config.timing.min_half_bit_us = 490;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_half_bit_outside_window_rejected() {
        let mut config = Config::default();
        config.timing.half_bit_us = 350; // boundary is excluded
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timing]\nhalf_bit_us = 420").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.timing.half_bit_us, 420);
        assert_eq!(config.timing.stop_condition_us, 1800);
    }

    #[test]
    fn test_load_invalid_file_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timing]\nstop_condition_us = 100").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = Config::load("/nonexistent/dali-bridge.toml");
        assert!(matches!(
            result,
            Err(crate::error::DaliBridgeError::Io(_))
        ));
    }
}
