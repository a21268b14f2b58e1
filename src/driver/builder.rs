//! Builder pattern for driver configuration.
//!
//! Provides a fluent API for wiring a [`Driver`] out of its collaborators.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use scroll_harvest::{
//!     Advance, Collector, Driver, ExtractionPolicy, Exporter, Interceptor, MemorySink, Result,
//! };
//!
//! struct Noop;
//!
//! #[async_trait]
//! impl Advance for Noop {
//!     async fn advance(&self) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # fn example() -> Result<()> {
//! let interceptor = Interceptor::new(ExtractionPolicy::default(), Arc::new(Collector::new()));
//!
//! let driver = Driver::builder()
//!     .interceptor(interceptor)
//!     .advancer(Noop)
//!     .exporter(Exporter::new(Arc::new(MemorySink::new())))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::export::Exporter;
use crate::network::Interceptor;

use super::advance::Advance;
use super::config::RunConfig;
use super::core::Driver;
use super::report::{Reporter, TracingReporter};

// ============================================================================
// DriverBuilder
// ============================================================================

/// Builder for configuring a [`Driver`] instance.
///
/// Use [`Driver::builder()`] to create a new builder.
#[derive(Clone, Default)]
pub struct DriverBuilder {
    /// Run policy.
    config: RunConfig,
    /// Interceptor feeding the collector.
    interceptor: Option<Interceptor>,
    /// Advancement capability.
    advancer: Option<Arc<dyn Advance>>,
    /// Export target.
    exporter: Option<Exporter>,
    /// Status channel; defaults to [`TracingReporter`].
    reporter: Option<Arc<dyn Reporter>>,
}

impl fmt::Debug for DriverBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverBuilder")
            .field("config", &self.config)
            .field("interceptor", &self.interceptor)
            .field("has_advancer", &self.advancer.is_some())
            .field("exporter", &self.exporter)
            .field("has_reporter", &self.reporter.is_some())
            .finish()
    }
}

// ============================================================================
// DriverBuilder Implementation
// ============================================================================

impl DriverBuilder {
    /// Creates a new builder with the default run policy.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the run policy.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the interceptor. The driver arms it on start.
    #[inline]
    #[must_use]
    pub fn interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    /// Sets the advancement capability.
    #[inline]
    #[must_use]
    pub fn advancer(mut self, advancer: impl Advance + 'static) -> Self {
        self.advancer = Some(Arc::new(advancer));
        self
    }

    /// Sets the exporter.
    #[inline]
    #[must_use]
    pub fn exporter(mut self, exporter: Exporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Sets the reporter.
    #[inline]
    #[must_use]
    pub fn reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Builds the driver with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the run policy is invalid
    /// - [`Error::Config`] if the interceptor, advancer or exporter is not set
    pub fn build(self) -> Result<Driver> {
        self.config.validate()?;

        let interceptor = self.interceptor.ok_or_else(|| {
            Error::config(
                "Interceptor is required. Use .interceptor() to set it.\n\
                 Example: Driver::builder().interceptor(Interceptor::new(policy, collector))",
            )
        })?;

        let advancer = self.advancer.ok_or_else(|| {
            Error::config(
                "Advancer is required. Use .advancer() to set it.\n\
                 Example: Driver::builder().advancer(page)",
            )
        })?;

        let exporter = self.exporter.ok_or_else(|| {
            Error::config(
                "Exporter is required. Use .exporter() to set it.\n\
                 Example: Driver::builder().exporter(Exporter::new(Arc::new(DirectorySink::new(\"./out\"))))",
            )
        })?;

        let reporter = self
            .reporter
            .unwrap_or_else(|| Arc::new(TracingReporter));

        Ok(Driver::from_parts(
            self.config,
            interceptor,
            advancer,
            exporter,
            reporter,
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
