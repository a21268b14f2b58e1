//! Export of collected records.
//!
//! The [`Exporter`] serializes a [`Snapshot`] as a pretty-printed JSON array
//! of `{"key", "value"}` objects and hands it to an [`ExportSink`]. The
//! artifact name embeds the record count: `<prefix>_complete_<N>.json`.
//!
//! Exporting an empty snapshot is not an error; it yields
//! [`ExportOutcome::Empty`] and touches no sink.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::collector::Snapshot;
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default artifact name prefix.
pub const DEFAULT_PREFIX: &str = "collected";

// ============================================================================
// Artifact
// ============================================================================

/// A persisted export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Artifact name (file name for directory sinks).
    pub name: String,

    /// Where the sink put it.
    pub location: String,
}

// ============================================================================
// ExportSink
// ============================================================================

/// Capability to persist a named textual artifact.
pub trait ExportSink: Send + Sync {
    /// Persists `contents` under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact could not be written.
    fn persist(&self, name: &str, contents: &str) -> Result<Artifact>;
}

impl<S: ExportSink + ?Sized> ExportSink for Arc<S> {
    fn persist(&self, name: &str, contents: &str) -> Result<Artifact> {
        (**self).persist(name, contents)
    }
}

// ============================================================================
// DirectorySink
// ============================================================================

/// Writes artifacts as files in a directory, creating it on demand.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Creates a sink writing into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the target directory.
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ExportSink for DirectorySink {
    fn persist(&self, name: &str, contents: &str) -> Result<Artifact> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::export(name, e.to_string()))?;

        let path = self.dir.join(name);
        fs::write(&path, contents).map_err(|e| Error::export(name, e.to_string()))?;

        debug!(path = %path.display(), bytes = contents.len(), "Artifact written");

        Ok(Artifact {
            name: name.to_string(),
            location: path.display().to_string(),
        })
    }
}

// ============================================================================
// MemorySink
// ============================================================================

/// Keeps artifacts in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `(name, contents)` of every artifact persisted so far.
    #[must_use]
    pub fn artifacts(&self) -> Vec<(String, String)> {
        self.artifacts.lock().clone()
    }

    /// Number of artifacts persisted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.lock().len()
    }

    /// Returns `true` if nothing was persisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ExportSink for MemorySink {
    fn persist(&self, name: &str, contents: &str) -> Result<Artifact> {
        self.artifacts
            .lock()
            .push((name.to_string(), contents.to_string()));
        Ok(Artifact {
            name: name.to_string(),
            location: format!("memory:{name}"),
        })
    }
}

// ============================================================================
// ExportOutcome
// ============================================================================

/// Counters reported with a written export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// The persisted artifact.
    pub artifact: Artifact,

    /// Records written.
    pub records: usize,

    /// Matching responses observed at export time.
    pub requests_observed: u64,
}

/// Result of one export call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Nothing collected, nothing written.
    Empty,

    /// An artifact was written.
    Written(ExportSummary),
}

impl ExportOutcome {
    /// Returns the summary if an artifact was written.
    #[inline]
    #[must_use]
    pub fn summary(&self) -> Option<&ExportSummary> {
        match self {
            Self::Written(summary) => Some(summary),
            Self::Empty => None,
        }
    }
}

impl fmt::Display for ExportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("nothing to export"),
            Self::Written(summary) => write!(
                f,
                "exported {} ({} records, {} requests observed)",
                summary.artifact.name, summary.records, summary.requests_observed
            ),
        }
    }
}

// ============================================================================
// Exporter
// ============================================================================

/// Serializes snapshots and delivers them to a sink.
#[derive(Clone)]
pub struct Exporter {
    sink: Arc<dyn ExportSink>,
    prefix: String,
}

impl fmt::Debug for Exporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exporter")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl Exporter {
    /// Creates an exporter with the default prefix.
    #[must_use]
    pub fn new(sink: Arc<dyn ExportSink>) -> Self {
        Self {
            sink,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    /// Sets the artifact name prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Returns the artifact name for `count` records.
    #[must_use]
    pub fn artifact_name(&self, count: usize) -> String {
        format!("{}_complete_{count}.json", self.prefix)
    }

    /// Serializes a snapshot's records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn render(snapshot: &Snapshot) -> Result<String> {
        Ok(serde_json::to_string_pretty(&snapshot.records)?)
    }

    /// Exports `snapshot`, or reports that there is nothing to export.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the artifact could not be persisted.
    pub fn export(&self, snapshot: &Snapshot) -> Result<ExportOutcome> {
        if snapshot.is_empty() {
            info!("Nothing to export");
            return Ok(ExportOutcome::Empty);
        }

        let name = self.artifact_name(snapshot.len());
        let contents = Self::render(snapshot)?;
        let artifact = self.sink.persist(&name, &contents)?;

        info!(
            artifact = %artifact.name,
            location = %artifact.location,
            records = snapshot.len(),
            requests = snapshot.requests_observed,
            "Export written"
        );

        Ok(ExportOutcome::Written(ExportSummary {
            artifact,
            records: snapshot.len(),
            requests_observed: snapshot.requests_observed,
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::Value;

    use crate::collector::{Collector, Record};

    fn snapshot(pairs: &[(&str, &str)], requests: u64) -> Snapshot {
        Snapshot {
            records: pairs.iter().map(|(k, v)| Record::new(*k, *v)).collect(),
            requests_observed: requests,
        }
    }

    #[test]
    fn test_artifact_name_embeds_count() {
        let exporter = Exporter::new(Arc::new(MemorySink::new()));
        assert_eq!(exporter.artifact_name(42), "collected_complete_42.json");

        let exporter = exporter.with_prefix("google_flow");
        assert_eq!(exporter.artifact_name(7), "google_flow_complete_7.json");
    }

    #[test]
    fn test_empty_snapshot_writes_nothing() {
        let sink = Arc::new(MemorySink::new());
        let exporter = Exporter::new(sink.clone());

        let outcome = exporter.export(&Snapshot::default()).expect("export");

        assert_eq!(outcome, ExportOutcome::Empty);
        assert_eq!(outcome.to_string(), "nothing to export");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_export_writes_pretty_json_array() {
        let sink = Arc::new(MemorySink::new());
        let exporter = Exporter::new(sink.clone());

        let outcome = exporter
            .export(&snapshot(&[("a", "https://x/a"), ("b", "https://x/b")], 5))
            .expect("export");

        let summary = outcome.summary().expect("written");
        assert_eq!(summary.records, 2);
        assert_eq!(summary.requests_observed, 5);
        assert_eq!(summary.artifact.name, "collected_complete_2.json");

        let (name, contents) = &sink.artifacts()[0];
        assert_eq!(name, "collected_complete_2.json");
        assert!(contents.contains("\n  {\n    \"key\": \"a\""));

        let parsed: Value = serde_json::from_str(contents).expect("json");
        assert_eq!(parsed[1]["key"], "b");
        assert_eq!(parsed[1]["value"], "https://x/b");
    }

    #[test]
    fn test_repeated_exports_are_content_equal() {
        let collector = Collector::new();
        collector.put("a", "1");
        collector.put("b", "2");

        let sink = Arc::new(MemorySink::new());
        let exporter = Exporter::new(sink.clone());
        exporter.export(&collector.snapshot()).expect("first");
        exporter.export(&collector.snapshot()).expect("second");

        let artifacts = sink.artifacts();
        assert_eq!(artifacts.len(), 2);

        let first: Vec<Record> = serde_json::from_str(&artifacts[0].1).expect("json");
        let second: Vec<Record> = serde_json::from_str(&artifacts[1].1).expect("json");
        assert_eq!(first, second);
    }

    #[test]
    fn test_directory_sink_writes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("nested/out");
        let exporter = Exporter::new(Arc::new(DirectorySink::new(&target)));

        let outcome = exporter
            .export(&snapshot(&[("k", "v")], 1))
            .expect("export");

        let path = target.join("collected_complete_1.json");
        assert!(path.exists());
        assert_eq!(
            outcome.summary().map(|s| s.artifact.location.clone()),
            Some(path.display().to_string())
        );

        let records: Vec<Record> =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(records, vec![Record::new("k", "v")]);
    }

    #[test]
    fn test_directory_sink_error_is_export_error() {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        let sink = DirectorySink::new(file.path().join("under-a-file"));

        let result = sink.persist("x.json", "[]");
        assert!(matches!(result, Err(Error::Export { .. })));
    }
}
