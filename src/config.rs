//! File-based configuration.
//!
//! Every field is optional; omitted fields take their defaults.
//!
//! ```json
//! {
//!   "run": { "poll_interval_ms": 2500, "max_attempts": 1000, "stall_threshold": 30 },
//!   "policy": {
//!     "endpoint": { "contains": "/api/feed" },
//!     "items": "data.posts[]",
//!     "key": "id",
//!     "value": "media.url"
//!   },
//!   "export_dir": "./out",
//!   "prefix": "feed",
//!   "download": { "output_dir": "./images", "timeout_ms": 30000 }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collector::Collector;
use crate::download::{DownloadConfig, Downloader};
use crate::driver::RunConfig;
use crate::error::{Error, Result};
use crate::export::{DEFAULT_PREFIX, DirectorySink, Exporter};
use crate::extract::ExtractionPolicy;
use crate::network::Interceptor;

// ============================================================================
// HarvestConfig
// ============================================================================

/// Everything a harvest needs apart from the page itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Run policy.
    pub run: RunConfig,

    /// Which responses to inspect and how to read them.
    pub policy: ExtractionPolicy,

    /// Directory artifacts are written to.
    pub export_dir: PathBuf,

    /// Artifact name prefix.
    pub prefix: String,

    /// Downloader settings.
    pub download: DownloadConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            policy: ExtractionPolicy::default(),
            export_dir: PathBuf::from("."),
            prefix: DEFAULT_PREFIX.to_string(),
            download: DownloadConfig::default(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl HarvestConfig {
    /// Loads and validates a config file.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Config`] if it does not parse or fails validation
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;

        let config = Self::from_json_str(&text)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;

        debug!(path = %path.display(), "Config loaded");

        Ok(config)
    }

    /// Parses and validates config text.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text does not parse
    /// - [`Error::Config`] if it fails validation
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the run policy is invalid or the prefix
    /// is empty.
    pub fn validate(&self) -> Result<()> {
        self.run.validate()?;

        if self.prefix.trim().is_empty() {
            return Err(Error::config("prefix must not be empty"));
        }

        Ok(())
    }
}

// ============================================================================
// Factories
// ============================================================================

impl HarvestConfig {
    /// Creates a disarmed interceptor applying this policy to `collector`.
    #[must_use]
    pub fn interceptor(&self, collector: Arc<Collector>) -> Interceptor {
        Interceptor::new(self.policy.clone(), collector)
    }

    /// Creates an exporter writing to `export_dir`.
    #[must_use]
    pub fn exporter(&self) -> Exporter {
        Exporter::new(Arc::new(DirectorySink::new(&self.export_dir))).with_prefix(&self.prefix)
    }

    /// Creates a downloader from the download settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn downloader(&self) -> Result<Downloader> {
        Downloader::new(self.download.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;

    use crate::collector::Snapshot;
    use crate::export::ExportOutcome;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = HarvestConfig::from_json_str("{}").expect("parse");

        assert_eq!(config.run, RunConfig::default());
        assert_eq!(config.prefix, "collected");
        assert_eq!(config.export_dir, PathBuf::from("."));
        assert!(config.policy.matches("https://x/api/trpc/searchProjectWorkflows"));
    }

    #[test]
    fn test_custom_policy_and_run() {
        let config = HarvestConfig::from_json_str(
            &json!({
                "run": {"poll_interval_ms": 100, "stall_threshold": 5},
                "policy": {
                    "endpoint": {"contains": "/api/feed"},
                    "items": "data.posts[]",
                    "key": "id",
                    "value": "media.url"
                },
                "prefix": "feed"
            })
            .to_string(),
        )
        .expect("parse");

        assert_eq!(config.run.poll_interval, Duration::from_millis(100));
        assert_eq!(config.run.stall_threshold, 5);
        assert_eq!(config.run.max_attempts, 1000);

        let extraction = config.policy.extract(&json!({
            "data": {"posts": [{"id": "p1", "media": {"url": "https://m/1"}}]}
        }));
        assert_eq!(extraction.records.len(), 1);
        assert!(!config.policy.matches("https://x/searchProjectWorkflows"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = HarvestConfig::from_json_str(r#"{"run": {"max_attempts": 0}}"#).unwrap_err();
        assert!(err.is_config_error());

        let err = HarvestConfig::from_json_str(r#"{"prefix": "  "}"#).unwrap_err();
        assert!(err.is_config_error());

        let err = HarvestConfig::from_json_str(
            r#"{"policy": {"endpoint": {"regex": "("}, "items": "a[]", "key": "k", "value": "v"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_json_file_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("harvest.json");
        std::fs::write(&path, "{ not json").expect("write");

        let err = HarvestConfig::from_json_file(&path).unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("harvest.json"));

        let missing = HarvestConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, Error::Io(_)));
    }

    #[test]
    fn test_exporter_uses_dir_and_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = HarvestConfig {
            export_dir: dir.path().to_path_buf(),
            prefix: "feed".into(),
            ..HarvestConfig::default()
        };

        let collector = Collector::new();
        collector.put("a", "1");
        let outcome = config.exporter().export(&collector.snapshot()).expect("export");

        assert!(matches!(outcome, ExportOutcome::Written(_)));
        assert!(dir.path().join("feed_complete_1.json").exists());

        let empty = config.exporter().export(&Snapshot::default()).expect("export");
        assert_eq!(empty, ExportOutcome::Empty);
    }

    #[test]
    fn test_interceptor_starts_disarmed() {
        let config = HarvestConfig::default();
        let interceptor = config.interceptor(Arc::new(Collector::new()));
        assert!(!interceptor.is_armed());
    }
}
