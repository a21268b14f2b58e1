//! Endpoint matching and record extraction.

// ============================================================================
// Imports
// ============================================================================

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collector::Record;
use crate::error::{Error, Result};

use super::path::{ExtractionPath, PathMiss, PathStep};

// ============================================================================
// Constants
// ============================================================================

/// Endpoint fragment of the media workflow search API.
pub const MEDIA_WORKFLOW_ENDPOINT: &str = "searchProjectWorkflows";

// ============================================================================
// EndpointMatcher
// ============================================================================

/// Decides whether a request URL belongs to the target endpoint.
///
/// Serialized externally tagged: `{"contains": "..."}` or `{"regex": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointMatcher {
    /// URL contains the substring.
    Contains(String),

    /// URL matches the regular expression.
    Regex(#[serde(with = "regex_text")] Regex),
}

impl EndpointMatcher {
    /// Creates a substring matcher.
    #[inline]
    #[must_use]
    pub fn contains(needle: impl Into<String>) -> Self {
        Self::Contains(needle.into())
    }

    /// Compiles a regex matcher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if the pattern does not compile.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| Error::invalid_pattern(pattern, e.to_string()))
    }

    /// Returns `true` if `url` targets this endpoint.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Contains(needle) => url.contains(needle.as_str()),
            Self::Regex(regex) => regex.is_match(url),
        }
    }
}

/// Serde adapter storing a [`Regex`] as its source text.
mod regex_text {
    use regex::Regex;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(regex: &Regex, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(regex.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Regex, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Regex::new(&pattern).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Records pulled out of one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Items where both key and value resolved.
    pub records: Vec<Record>,

    /// Branches of the item path that could not be followed.
    pub misses: Vec<PathMiss>,

    /// Items reached whose key or value did not resolve.
    pub incomplete: usize,
}

// ============================================================================
// ExtractionPolicy
// ============================================================================

/// Configured extraction: which responses to inspect and how to read them.
///
/// `items` selects candidate objects in the payload; `key` and `value` are
/// resolved relative to each item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionPolicy {
    /// Endpoint predicate applied to the request URL.
    pub endpoint: EndpointMatcher,

    /// Path from the payload root to the candidate items.
    pub items: ExtractionPath,

    /// Path from an item to its key.
    pub key: ExtractionPath,

    /// Path from an item to its value.
    pub value: ExtractionPath,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self::media_workflows()
    }
}

impl ExtractionPolicy {
    /// Creates a policy from its parts.
    #[must_use]
    pub fn new(
        endpoint: EndpointMatcher,
        items: ExtractionPath,
        key: ExtractionPath,
        value: ExtractionPath,
    ) -> Self {
        Self {
            endpoint,
            items,
            key,
            value,
        }
    }

    /// Policy for the media workflow search API.
    ///
    /// Items are the media generations of every step of every workflow;
    /// the key is the media key and the value the image URI.
    #[must_use]
    pub fn media_workflows() -> Self {
        let items = ExtractionPath::new(vec![
            PathStep::field("result"),
            PathStep::field("data"),
            PathStep::field("json"),
            PathStep::field("result"),
            PathStep::field("workflows"),
            PathStep::Each,
            PathStep::optional("workflowSteps"),
            PathStep::Each,
            PathStep::optional("mediaGenerations"),
            PathStep::Each,
        ]);
        let key = ExtractionPath::new(vec![
            PathStep::optional("mediaGenerationId"),
            PathStep::optional("mediaKey"),
        ]);
        let value = ExtractionPath::new(vec![
            PathStep::optional("mediaData"),
            PathStep::optional("imageData"),
            PathStep::optional("fifeUri"),
        ]);

        Self::new(
            EndpointMatcher::contains(MEDIA_WORKFLOW_ENDPOINT),
            items,
            key,
            value,
        )
    }

    /// Returns `true` if responses to `url` should be inspected.
    #[inline]
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        self.endpoint.matches(url)
    }

    /// Pulls records out of a parsed payload.
    #[must_use]
    pub fn extract(&self, payload: &Value) -> Extraction {
        let selection = self.items.select(payload);
        let mut records = Vec::with_capacity(selection.nodes.len());
        let mut incomplete = 0;

        for item in selection.nodes {
            match (self.key.resolve_str(item), self.value.resolve_str(item)) {
                (Some(key), Some(value)) => records.push(Record::new(key, value)),
                _ => incomplete += 1,
            }
        }

        Extraction {
            records,
            misses: selection.misses,
            incomplete,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn media(key: &str, uri: &str) -> Value {
        json!({
            "mediaGenerationId": {"mediaKey": key},
            "mediaData": {"imageData": {"fifeUri": uri}}
        })
    }

    fn payload(workflows: Value) -> Value {
        json!({"result": {"data": {"json": {"result": {"workflows": workflows}}}}})
    }

    #[test]
    fn test_contains_matcher() {
        let matcher = EndpointMatcher::contains(MEDIA_WORKFLOW_ENDPOINT);
        assert!(matcher.matches("https://app/api/trpc/searchProjectWorkflows?batch=1"));
        assert!(!matcher.matches("https://app/api/trpc/getProject"));
    }

    #[test]
    fn test_regex_matcher() {
        let matcher = EndpointMatcher::regex(r"/api/v\d+/items").expect("compile");
        assert!(matcher.matches("https://host/api/v2/items?page=3"));
        assert!(!matcher.matches("https://host/api/vx/items"));
        assert!(EndpointMatcher::regex("(").is_err());
    }

    #[test]
    fn test_matcher_serde() {
        let matcher: EndpointMatcher =
            serde_json::from_str(r#"{"regex": "feed\\?cursor="}"#).expect("parse");
        assert!(matcher.matches("https://x/feed?cursor=abc"));

        let json = serde_json::to_string(&EndpointMatcher::contains("feed")).expect("ser");
        assert_eq!(json, r#"{"contains":"feed"}"#);

        assert!(serde_json::from_str::<EndpointMatcher>(r#"{"regex": "("}"#).is_err());
    }

    #[test]
    fn test_media_workflows_extracts_nested_records() {
        let doc = payload(json!([
            {"workflowSteps": [
                {"mediaGenerations": [media("k1", "https://img/1"), media("k2", "https://img/2")]},
                {"mediaGenerations": [media("k3", "https://img/3")]}
            ]},
            {"workflowSteps": [{"mediaGenerations": [media("k4", "https://img/4")]}]}
        ]));

        let extraction = ExtractionPolicy::media_workflows().extract(&doc);
        let keys: Vec<&str> = extraction.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, ["k1", "k2", "k3", "k4"]);
        assert_eq!(extraction.records[2].value, "https://img/3");
        assert!(extraction.misses.is_empty());
        assert_eq!(extraction.incomplete, 0);
    }

    #[test]
    fn test_media_workflows_skips_incomplete_items() {
        let doc = payload(json!([
            {"workflowSteps": [{"mediaGenerations": [
                media("k1", ""),
                {"mediaGenerationId": {"mediaKey": "k2"}},
                media("k3", "https://img/3")
            ]}]},
            {},
            {"workflowSteps": null}
        ]));

        let extraction = ExtractionPolicy::media_workflows().extract(&doc);
        assert_eq!(extraction.records, vec![Record::new("k3", "https://img/3")]);
        assert_eq!(extraction.incomplete, 2);
        assert!(extraction.misses.is_empty());
    }

    #[test]
    fn test_shape_mismatch_yields_misses_not_records() {
        let extraction = ExtractionPolicy::media_workflows().extract(&json!({"error": "nope"}));
        assert!(extraction.records.is_empty());
        assert_eq!(extraction.misses.len(), 1);
        assert_eq!(extraction.misses[0].segment, "result");
    }

    #[test]
    fn test_policy_round_trips_through_json() {
        let policy: ExtractionPolicy = serde_json::from_str(
            r#"{
                "endpoint": {"contains": "/feed"},
                "items": "data.posts[]",
                "key": "id",
                "value": "image?.src"
            }"#,
        )
        .expect("parse");

        let doc = json!({"data": {"posts": [
            {"id": "p1", "image": {"src": "https://a/1.png"}},
            {"id": "p2"}
        ]}});

        let extraction = policy.extract(&doc);
        assert_eq!(extraction.records, vec![Record::new("p1", "https://a/1.png")]);
        assert_eq!(extraction.incomplete, 1);
    }
}
