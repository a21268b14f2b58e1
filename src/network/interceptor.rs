//! Pass-through response interceptor.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};

use crate::collector::Collector;
use crate::error::Result;
use crate::extract::ExtractionPolicy;

use super::types::{Fetch, FetchRequest, FetchResponse};

// ============================================================================
// Observation
// ============================================================================

/// What the interceptor did with one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Not armed, or the request did not target the endpoint.
    Ignored,

    /// Matching response whose body is not JSON. Counted, nothing stored.
    Unparsable,

    /// Matching response that was parsed and fed to the collector.
    Collected {
        /// Records extracted from the payload.
        records: usize,
        /// Records whose key was new.
        new_keys: usize,
        /// Item-path branches that did not match the payload shape.
        misses: usize,
    },
}

impl Observation {
    /// Returns `true` if the response counted as a matching request.
    #[inline]
    #[must_use]
    pub fn is_counted(&self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

// ============================================================================
// Interceptor
// ============================================================================

/// Observes responses, extracts records and feeds the collector.
///
/// Cheap to clone; clones share the policy, collector and armed flag.
///
/// # Example
///
/// ```ignore
/// let collector = Arc::new(Collector::new());
/// let interceptor = Interceptor::new(ExtractionPolicy::default(), Arc::clone(&collector));
///
/// // Hand the wrapped capability to the application instead of the raw one.
/// let fetch = interceptor.wrap(host_fetch);
/// interceptor.arm();
/// let response = fetch.fetch(FetchRequest::get(url)).await?;
/// ```
#[derive(Clone)]
pub struct Interceptor {
    inner: Arc<InterceptorInner>,
}

struct InterceptorInner {
    policy: ExtractionPolicy,
    collector: Arc<Collector>,
    armed: AtomicBool,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("endpoint", &self.inner.policy.endpoint)
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}

impl Interceptor {
    /// Creates a disarmed interceptor feeding `collector`.
    #[must_use]
    pub fn new(policy: ExtractionPolicy, collector: Arc<Collector>) -> Self {
        Self {
            inner: Arc::new(InterceptorInner {
                policy,
                collector,
                armed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the collector this interceptor feeds.
    #[inline]
    #[must_use]
    pub fn collector(&self) -> &Arc<Collector> {
        &self.inner.collector
    }

    /// Returns the extraction policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &ExtractionPolicy {
        &self.inner.policy
    }

    /// Starts observing responses.
    pub fn arm(&self) {
        self.inner.armed.store(true, Ordering::SeqCst);
        debug!("Interceptor armed");
    }

    /// Stops observing responses.
    pub fn disarm(&self) {
        self.inner.armed.store(false, Ordering::SeqCst);
        debug!("Interceptor disarmed");
    }

    /// Returns `true` if responses are being observed.
    #[inline]
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.inner.armed.load(Ordering::SeqCst)
    }

    /// Inspects one response to a request for `url`.
    ///
    /// Never fails: unparsable bodies and foreign shapes are skipped.
    pub fn observe(&self, url: &str, body: &str) -> Observation {
        if !self.is_armed() || !self.inner.policy.matches(url) {
            trace!(url, "Response ignored");
            return Observation::Ignored;
        }

        let payload: Value = match serde_json::from_str(body) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(url, error = %e, "Unparsable response body skipped");
                self.inner.collector.observe_response(Vec::new());
                return Observation::Unparsable;
            }
        };

        let extraction = self.inner.policy.extract(&payload);
        let records = extraction.records.len();
        let misses = extraction.misses.len();

        for miss in &extraction.misses {
            debug!(url, %miss, "Payload shape mismatch");
        }

        let new_keys = self.inner.collector.observe_response(extraction.records);

        debug!(
            url,
            records,
            new_keys,
            incomplete = extraction.incomplete,
            total = self.inner.collector.size(),
            "Response collected"
        );

        Observation::Collected {
            records,
            new_keys,
            misses,
        }
    }

    /// Wraps a fetch capability so every response passes through
    /// [`Interceptor::observe`] before reaching the caller unchanged.
    #[must_use]
    pub fn wrap<F: Fetch>(&self, inner: F) -> InterceptedFetch<F> {
        InterceptedFetch {
            inner,
            interceptor: self.clone(),
        }
    }
}

// ============================================================================
// InterceptedFetch
// ============================================================================

/// A [`Fetch`] that reports responses to an [`Interceptor`].
#[derive(Debug)]
pub struct InterceptedFetch<F> {
    inner: F,
    interceptor: Interceptor,
}

impl<F> InterceptedFetch<F> {
    /// Returns the wrapped capability.
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Unwraps into the original capability.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> F {
        self.inner
    }
}

#[async_trait]
impl<F: Fetch> Fetch for InterceptedFetch<F> {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let url = request.url.clone();
        let response = self.inner.fetch(request).await?;
        self.interceptor.observe(&url, &response.body);
        Ok(response)
    }
}

// ============================================================================
// Tests
// ============================================================================
