//! Network capability and message types.

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// FetchRequest
// ============================================================================

/// An outbound network request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Request URL.
    pub url: String,

    /// HTTP method (GET, POST, etc.).
    pub method: String,

    /// Request headers.
    pub headers: HashMap<String, String>,

    /// Request body (if any).
    pub body: Option<String>,
}

impl FetchRequest {
    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Creates a POST request with a body.
    #[must_use]
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "POST".to_string(),
            headers: HashMap::new(),
            body: Some(body.into()),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

// ============================================================================
// FetchResponse
// ============================================================================

/// A completed network response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Final response URL.
    pub url: String,

    /// HTTP status code.
    pub status: u16,

    /// HTTP status text.
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body as text.
    pub body: String,
}

impl FetchResponse {
    /// Creates a `200 OK` response with the given body.
    #[must_use]
    pub fn ok(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx statuses.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ============================================================================
// Fetch
// ============================================================================

/// Capability to perform network calls.
///
/// The host supplies an implementation; the interceptor wraps it and hands
/// back another `Fetch` rather than patching the original in place.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Performs the request and returns the full response.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse>;
}

#[async_trait]
impl<F: Fetch + ?Sized> Fetch for Arc<F> {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        (**self).fetch(request).await
    }
}

#[async_trait]
impl<F: Fetch + ?Sized> Fetch for Box<F> {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        (**self).fetch(request).await
    }
}

// ============================================================================
// HttpFetch
// ============================================================================

/// [`Fetch`] backed by a `reqwest` client.
///
/// Useful when the paginated API can be called directly instead of through
/// a browser page.
#[derive(Debug, Clone, Default)]
pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    /// Creates a fetcher with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher around an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for HttpFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::protocol(format!("Invalid HTTP method: {}", request.method)))?;

        debug!(method = %method, url = %request.url, "HTTP fetch");

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();
        let body = response.text().await?;

        Ok(FetchResponse {
            url,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
