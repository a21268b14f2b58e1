//! Run driver module.
//!
//! Drives one collection run: repeatedly advances the host application,
//! watches the collector for growth and stops on stall, attempt cap or
//! request.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Driver`] | Run state machine and advancement loop |
//! | [`DriverBuilder`] | Fluent configuration builder |
//! | [`RunConfig`] | Poll interval, attempt cap, stall threshold |
//! | [`Advance`] | Capability that moves the viewport forward |
//! | [`Reporter`] | Status channel for [`RunEvent`]s |
//!
//! # Example
//!
//! ```ignore
//! use scroll_harvest::{Driver, Result};
//!
//! # async fn example(driver: Driver) -> Result<()> {
//! let task = driver.start()?;
//! let report = task.wait().await?;
//! println!("{}: {} records", report.reason, report.records);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Advancement capability.
pub mod advance;

/// Fluent builder pattern for driver configuration.
pub mod builder;

/// Run policy configuration.
pub mod config;

/// Core driver implementation.
pub mod core;

/// Run events, reporters and reports.
pub mod report;

// ============================================================================
// Re-exports
// ============================================================================

pub use advance::Advance;
pub use builder::DriverBuilder;
pub use config::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, DEFAULT_STALL_THRESHOLD, RunConfig,
};
pub use core::{Driver, RunState, RunTask};
pub use report::{
    ChannelReporter, Reporter, RunEvent, RunReport, StopOutcome, StopReason, TracingReporter,
};
