//! Network observation.
//!
//! The host hands over a [`Fetch`] capability; [`Interceptor::wrap`] returns a
//! new capability that delivers every response to the caller unchanged while
//! extracting records from the ones that target the configured endpoint.
//!
//! Responses that arrive some other way (for example as bridge events) go
//! straight to [`Interceptor::observe`].
//!
//! # Example
//!
//! ```ignore
//! use scroll_harvest::network::{Fetch, FetchRequest, HttpFetch, Interceptor};
//!
//! let interceptor = Interceptor::new(policy, collector);
//! let fetch = interceptor.wrap(HttpFetch::new());
//! interceptor.arm();
//!
//! let response = fetch.fetch(FetchRequest::get(url)).await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Pass-through interceptor.
pub mod interceptor;

/// Fetch capability and message types.
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use interceptor::{InterceptedFetch, Interceptor, Observation};
pub use types::{Fetch, FetchRequest, FetchResponse, HttpFetch};
