//! Configuration-driven record extraction.
//!
//! Response payloads are generic JSON trees. An [`ExtractionPolicy`] names
//! the endpoint to watch and the paths leading to each record's key and
//! value, so the same interceptor works for differently shaped APIs.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `path` | Path syntax, parsing and tree traversal |
//! | `policy` | Endpoint matching and record extraction |
//!
//! # Example
//!
//! ```
//! use scroll_harvest::extract::{EndpointMatcher, ExtractionPath, ExtractionPolicy};
//! use serde_json::json;
//!
//! # fn main() -> scroll_harvest::Result<()> {
//! let policy = ExtractionPolicy::new(
//!     EndpointMatcher::contains("/feed"),
//!     ExtractionPath::parse("data.items[]")?,
//!     ExtractionPath::parse("id")?,
//!     ExtractionPath::parse("thumbnail?.url")?,
//! );
//!
//! let payload = json!({"data": {"items": [{"id": "a", "thumbnail": {"url": "https://x/a.jpg"}}]}});
//! let extraction = policy.extract(&payload);
//! assert_eq!(extraction.records.len(), 1);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Path syntax and traversal.
pub mod path;

/// Endpoint matching and extraction.
pub mod policy;

// ============================================================================
// Re-exports
// ============================================================================

pub use path::{ExtractionPath, MissKind, PathMiss, PathStep, Selection};
pub use policy::{EndpointMatcher, Extraction, ExtractionPolicy, MEDIA_WORKFLOW_ENDPOINT};
