//! Run policy configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use scroll_harvest::RunConfig;
//!
//! let config = RunConfig::new()
//!     .with_poll_interval(Duration::from_millis(1500))
//!     .with_stall_threshold(10);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.max_attempts, 1000);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default wait between advancement attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2500);

/// Default hard cap on advancement attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

/// Default number of consecutive no-growth samples that ends a run.
pub const DEFAULT_STALL_THRESHOLD: u32 = 30;

// ============================================================================
// RunConfig
// ============================================================================

/// Constant policy values for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Wait between advancement attempts.
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,

    /// Hard cap on advancement attempts.
    pub max_attempts: u32,

    /// Consecutive no-growth samples before the run counts as complete.
    pub stall_threshold: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RunConfig {
    /// Creates a config with the default policy values.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RunConfig {
    /// Sets the wait between advancement attempts.
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the attempt cap.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the stall threshold.
    #[inline]
    #[must_use]
    pub fn with_stall_threshold(mut self, threshold: u32) -> Self {
        self.stall_threshold = threshold;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl RunConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the attempt cap or stall threshold is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("max_attempts must be greater than 0"));
        }

        if self.stall_threshold == 0 {
            return Err(Error::config("stall_threshold must be greater than 0"));
        }

        Ok(())
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================
