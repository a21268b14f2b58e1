//! Scroll Harvest - Collect records from paginated web apps.
//!
//! This library drives an infinitely scrolling page, watches the responses
//! it fetches while loading more content, and collects `{key, value}`
//! records out of them until the feed runs dry.
//!
//! # Architecture
//!
//! A run has three cooperating parts:
//!
//! - **Interceptor**: sees every response, extracts records from the ones
//!   that target the configured endpoint, and hands the response back
//!   unchanged
//! - **Collector**: deduplicates records by key (last write wins)
//! - **Driver**: advances the page on a fixed interval and stops after a
//!   stretch of polls with no new keys, at an attempt cap, or on request
//!
//! Key design principles:
//!
//! - Extraction is data ([`ExtractionPolicy`]), not code
//! - Nothing the page receives is ever altered
//! - Every stop path exports at most once
//! - The host page talks to Rust over a local WebSocket bridge
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scroll_harvest::bridge::BridgeServer;
//! use scroll_harvest::{Collector, Driver, HarvestConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = HarvestConfig::default();
//!     let collector = Arc::new(Collector::new());
//!
//!     // Paste the printed script into the page's devtools console
//!     let server = BridgeServer::bind_local().await?;
//!     println!("{}", server.script());
//!     let page = server.attach(config.interceptor(Arc::clone(&collector))).await?;
//!
//!     let driver = Driver::builder()
//!         .config(config.run)
//!         .interceptor(page.interceptor().clone())
//!         .advancer(page)
//!         .exporter(config.exporter())
//!         .build()?;
//!
//!     let report = driver.run().await?;
//!     println!("{}: {} records", report.reason, report.records);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | WebSocket bridge to the host page |
//! | [`collector`] | Deduplicating record store |
//! | [`config`] | File-based configuration |
//! | [`download`] | Fetches the files an artifact points at |
//! | [`driver`] | Run state machine and advancement loop |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`export`] | Artifact rendering and sinks |
//! | [`extract`] | Endpoint matching and payload paths |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`network`] | Fetch capability and interceptor |

// ============================================================================
// Modules
// ============================================================================

/// WebSocket bridge to the host page.
///
/// Internal protocol types plus [`BridgeServer`](bridge::BridgeServer) and
/// [`BridgePage`](bridge::BridgePage).
pub mod bridge;

/// Deduplicating record store.
pub mod collector;

/// File-based configuration.
pub mod config;

/// Downloads the files referenced by an exported artifact.
pub mod download;

/// Run driver and configuration.
///
/// Use [`Driver::builder()`] to create a configured driver instance.
pub mod driver;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Artifact rendering and sinks.
pub mod export;

/// Endpoint matching and payload extraction.
pub mod extract;

/// Type-safe identifiers.
pub mod identifiers;

/// Fetch capability and response interception.
pub mod network;

// ============================================================================
// Re-exports
// ============================================================================

// Collection types
pub use collector::{Collector, Record, Snapshot};

// Config types
pub use config::HarvestConfig;

// Download types
pub use download::{DownloadConfig, DownloadSummary, Downloader};

// Driver types
pub use driver::{
    Advance, ChannelReporter, Driver, DriverBuilder, Reporter, RunConfig, RunEvent, RunReport,
    RunState, RunTask, StopOutcome, StopReason, TracingReporter,
};

// Error types
pub use error::{Error, Result};

// Export types
pub use export::{
    Artifact, DirectorySink, ExportOutcome, ExportSink, ExportSummary, Exporter, MemorySink,
};

// Extraction types
pub use extract::{EndpointMatcher, ExtractionPath, ExtractionPolicy};

// Identifier types
pub use identifiers::{RequestId, RunId};

// Network types
pub use network::{
    Fetch, FetchRequest, FetchResponse, HttpFetch, InterceptedFetch, Interceptor, Observation,
};
