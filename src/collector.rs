//! Deduplicating record store.
//!
//! The [`Collector`] maps record keys to values with last-write-wins
//! semantics, keeps first-insertion order for export, and counts matching
//! responses observed by the interceptor.
//!
//! # Thread Safety
//!
//! All state sits behind one `parking_lot::Mutex`, so [`Collector::put`],
//! [`Collector::size`] and [`Collector::snapshot`] never observe a torn
//! write. The interceptor may run on any task while the driver samples.
//!
//! # Example
//!
//! ```
//! use scroll_harvest::Collector;
//!
//! let collector = Collector::new();
//! collector.put("A", "1");
//! collector.put("B", "2");
//! collector.put("A", "3");
//!
//! assert_eq!(collector.size(), 2);
//! let snapshot = collector.snapshot();
//! assert_eq!(snapshot.records[0].value, "3");
//! ```

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Record
// ============================================================================

/// A unique key paired with a resolved value (typically a media URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    /// Opaque unique identifier.
    pub key: String,

    /// Resolved resource locator.
    ///
    /// Older exports named this field `url`.
    #[serde(alias = "url")]
    pub value: String,
}

impl Record {
    /// Creates a new record.
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time copy of a collector.
///
/// Later mutation of the collector does not affect a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Records in first-insertion order, each with its latest value.
    pub records: Vec<Record>,

    /// Matching responses observed when the snapshot was taken.
    pub requests_observed: u64,
}

impl Snapshot {
    /// Number of distinct records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records were collected.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Ordered, deduplicating key/value store with a request counter.
#[derive(Debug, Default)]
pub struct Collector {
    inner: Mutex<CollectorInner>,
}

/// State guarded by the collector's mutex.
#[derive(Debug, Default)]
struct CollectorInner {
    /// Key to position in `records`.
    index: FxHashMap<String, usize>,
    /// Records in first-insertion order.
    records: Vec<Record>,
    /// Matching responses observed.
    requests_observed: u64,
}

impl CollectorInner {
    fn put(&mut self, record: Record) -> bool {
        match self.index.get(&record.key) {
            Some(&position) => {
                self.records[position].value = record.value;
                false
            }
            None => {
                self.index.insert(record.key.clone(), self.records.len());
                self.records.push(record);
                true
            }
        }
    }
}

// ============================================================================
// Collector - Public API
// ============================================================================

impl Collector {
    /// Creates an empty collector.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the value for `key`.
    ///
    /// Returns `true` if the key was not present before.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> bool {
        self.inner.lock().put(Record::new(key, value))
    }

    /// Records one matching response and stores the records it yielded.
    ///
    /// The counter increments once regardless of how many records are given
    /// (including none). Everything happens under a single lock.
    ///
    /// Returns the number of keys that were new.
    pub fn observe_response(&self, records: impl IntoIterator<Item = Record>) -> usize {
        let mut inner = self.inner.lock();
        inner.requests_observed += 1;
        records
            .into_iter()
            .map(|record| inner.put(record))
            .filter(|inserted| *inserted)
            .count()
    }

    /// Current number of distinct keys.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Returns `true` if nothing has been collected.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Matching responses observed so far.
    #[inline]
    #[must_use]
    pub fn requests_observed(&self) -> u64 {
        self.inner.lock().requests_observed
    }

    /// Looks up the latest value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .index
            .get(key)
            .map(|&position| inner.records[position].value.clone())
    }

    /// Copies the current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot {
            records: inner.records.clone(),
            requests_observed: inner.requests_observed,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Arc;

    use proptest::prelude::*;

    #[test]
    fn test_put_reports_new_keys() {
        let collector = Collector::new();
        assert!(collector.put("A", "1"));
        assert!(!collector.put("A", "2"));
        assert_eq!(collector.size(), 1);
        assert_eq!(collector.get("A").as_deref(), Some("2"));
    }

    #[test]
    fn test_three_responses_scenario() {
        let collector = Collector::new();
        collector.observe_response([Record::new("A", "1")]);
        collector.observe_response([Record::new("B", "2")]);
        collector.observe_response([Record::new("A", "3")]);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.requests_observed, 3);
        assert_eq!(
            snapshot.records,
            vec![Record::new("A", "3"), Record::new("B", "2")]
        );
    }

    #[test]
    fn test_empty_response_still_counts() {
        let collector = Collector::new();
        let new_keys = collector.observe_response(Vec::new());
        assert_eq!(new_keys, 0);
        assert_eq!(collector.requests_observed(), 1);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_observe_response_counts_new_keys() {
        let collector = Collector::new();
        collector.put("A", "1");
        let new_keys = collector.observe_response([
            Record::new("A", "9"),
            Record::new("B", "2"),
            Record::new("C", "3"),
        ]);
        assert_eq!(new_keys, 2);
        assert_eq!(collector.size(), 3);
    }

    #[test]
    fn test_snapshot_is_point_in_time() {
        let collector = Collector::new();
        collector.put("A", "1");
        let snapshot = collector.snapshot();

        collector.put("A", "changed");
        collector.put("B", "2");

        assert_eq!(snapshot.records, vec![Record::new("A", "1")]);
        assert_eq!(collector.size(), 2);
    }

    #[test]
    fn test_record_accepts_legacy_url_field() {
        let record: Record =
            serde_json::from_str(r#"{"key":"k","url":"https://x/y.jpg"}"#).expect("parse");
        assert_eq!(record.value, "https://x/y.jpg");

        let json = serde_json::to_string(&record).expect("serialize");
        assert_eq!(json, r#"{"key":"k","value":"https://x/y.jpg"}"#);
    }

    #[tokio::test]
    async fn test_concurrent_puts() {
        let collector = Arc::new(Collector::new());
        let mut handles = Vec::new();

        for task in 0..8 {
            let collector = Arc::clone(&collector);
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    collector.put(format!("k{i}"), format!("t{task}"));
                }
            }));
        }

        for handle in handles {
            handle.await.expect("task");
        }

        assert_eq!(collector.size(), 100);
    }

    proptest! {
        #[test]
        fn prop_last_write_wins(ops in prop::collection::vec((0u8..16, 0u32..1000), 0..200)) {
            let collector = Collector::new();
            let mut expected: HashMap<String, String> = HashMap::new();
            let mut order: Vec<String> = Vec::new();

            for (key, value) in &ops {
                let key = format!("k{key}");
                if !expected.contains_key(&key) {
                    order.push(key.clone());
                }
                expected.insert(key.clone(), value.to_string());
                collector.put(key, value.to_string());
            }

            prop_assert_eq!(collector.size(), expected.len());

            let snapshot = collector.snapshot();
            let keys: Vec<String> = snapshot.records.iter().map(|r| r.key.clone()).collect();
            prop_assert_eq!(keys, order);
            for record in &snapshot.records {
                prop_assert_eq!(Some(&record.value), expected.get(&record.key));
            }
        }
    }
}
