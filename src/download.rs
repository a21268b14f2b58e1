//! Downloads the files referenced by an exported artifact.
//!
//! Each record's value is fetched and saved as `<key>.jpg` in the output
//! directory. Keys that already have a file there are skipped, so an
//! interrupted download can simply be re-run.
//!
//! # Example
//!
//! ```ignore
//! use scroll_harvest::download::{DownloadConfig, Downloader};
//!
//! let downloader = Downloader::new(DownloadConfig::new("./images"))?;
//! let summary = downloader.download_file("collected_complete_120.json").await?;
//! println!("{summary}");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::collector::Record;
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default per-file request timeout.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Extension given to downloaded files.
const FILE_EXTENSION: &str = "jpg";

/// Length of the UUID-shaped keys embedded in legacy file names.
const LEGACY_KEY_LEN: usize = 36;

/// Progress is logged after this many processed records.
const PROGRESS_EVERY: usize = 10;

// ============================================================================
// DownloadConfig
// ============================================================================

/// Where and how to download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory the files are written to. Created if missing.
    pub output_dir: PathBuf,

    /// Per-file request timeout.
    #[serde(rename = "timeout_ms", with = "timeout_ms")]
    pub timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self::new("downloads")
    }
}

impl DownloadConfig {
    /// Creates a config writing to `output_dir`.
    #[inline]
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }

    /// Sets the per-file timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

mod timeout_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// DownloadSummary
// ============================================================================

/// Counts from one download pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Records in the artifact.
    pub total: usize,
    /// Records skipped because their file already exists (or their key
    /// repeats earlier in the artifact).
    pub already_present: usize,
    /// Files written.
    pub succeeded: usize,
    /// Records that could not be downloaded.
    pub failed: usize,
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records: {} downloaded, {} failed, {} already present",
            self.total, self.succeeded, self.failed, self.already_present
        )
    }
}

// ============================================================================
// Downloader
// ============================================================================

/// Sequential downloader for exported records.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    config: DownloadConfig,
}

impl Downloader {
    /// Creates a downloader with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the client cannot be built.
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Creates a downloader using an existing client.
    ///
    /// The client's own timeout applies.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: DownloadConfig) -> Self {
        Self { client, config }
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Returns the file name used for `key`.
    #[must_use]
    pub fn file_name(key: &str) -> String {
        format!("{}.{FILE_EXTENSION}", urlencoding::encode(key))
    }

    /// Reads an exported artifact.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Json`] if it is not a list of records
    pub async fn load_records(path: impl AsRef<Path>) -> Result<Vec<Record>> {
        let text = fs::read_to_string(path.as_ref()).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Returns the keys that already have a file in the output directory.
    ///
    /// Legacy names of the form `<prefix>_<uuid>.jpg` contribute the UUID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory exists but cannot be read.
    pub async fn existing_keys(&self) -> Result<FxHashSet<String>> {
        let mut keys = FxHashSet::default();

        let mut entries = match fs::read_dir(&self.config.output_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            if let Some((_, tail)) = stem.rsplit_once('_')
                && tail.len() == LEGACY_KEY_LEN
            {
                keys.insert(tail.to_string());
            }

            let key = urlencoding::decode(stem).map_or_else(|_| stem.to_string(), |k| k.into_owned());
            keys.insert(key);
        }

        Ok(keys)
    }

    /// Downloads every record of the artifact at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the artifact or output directory is
    /// unusable; individual download failures are counted.
    pub async fn download_file(&self, path: impl AsRef<Path>) -> Result<DownloadSummary> {
        let records = Self::load_records(path).await?;
        self.download(&records).await
    }

    /// Downloads `records` one at a time.
    ///
    /// # Errors
    ///
    /// Same as [`download_file`](Self::download_file).
    pub async fn download(&self, records: &[Record]) -> Result<DownloadSummary> {
        fs::create_dir_all(&self.config.output_dir).await?;

        let mut present = self.existing_keys().await?;
        let mut summary = DownloadSummary {
            total: records.len(),
            ..DownloadSummary::default()
        };

        info!(
            total = records.len(),
            existing = present.len(),
            dir = %self.config.output_dir.display(),
            "Download started"
        );

        let pending: Vec<&Record> = records
            .iter()
            .filter(|record| {
                let fresh = present.insert(record.key.clone());
                if !fresh {
                    summary.already_present += 1;
                }
                fresh
            })
            .collect();

        for (index, record) in pending.iter().enumerate() {
            match self.fetch_one(record).await {
                Ok(bytes) => {
                    summary.succeeded += 1;
                    debug!(key = %record.key, bytes, "Downloaded");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(key = %record.key, error = %e, "Download failed");
                }
            }

            let done = index + 1;
            if done % PROGRESS_EVERY == 0 || done == pending.len() {
                info!(
                    done,
                    of = pending.len(),
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    "Download progress"
                );
            }
        }

        info!(%summary, "Download finished");

        Ok(summary)
    }

    /// Streams one record's value to disk and returns the bytes written.
    ///
    /// A partially written file is removed.
    async fn fetch_one(&self, record: &Record) -> Result<u64> {
        let url = Url::parse(&record.value)
            .map_err(|e| Error::download(&record.key, format!("invalid URL: {e}")))?;

        let path = self.config.output_dir.join(Self::file_name(&record.key));

        let result = self.stream_to(url, &path).await;
        if result.is_err() {
            let _ = fs::remove_file(&path).await;
        }

        result.map_err(|e| match e {
            Error::Download { .. } => e,
            other => Error::download(&record.key, other.to_string()),
        })
    }

    async fn stream_to(&self, url: Url, path: &Path) -> Result<u64> {
        let mut response = self.client.get(url).send().await?.error_for_status()?;

        let mut file = fs::File::create(path).await?;
        let mut written = 0u64;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;

        Ok(written)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LEGACY_KEY: &str = "0b5c7a44-2f53-4d0f-9a8e-3c1d2e4f5a6b";

    async fn server() -> MockServer {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/img/a"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"AAAA".to_vec()))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/img/b"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"BB".to_vec()))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/img/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        server
    }

    fn downloader(dir: &Path) -> Downloader {
        Downloader::new(DownloadConfig::new(dir).with_timeout(Duration::from_secs(5)))
            .expect("client")
    }

    #[test]
    fn test_file_name_escapes_key() {
        assert_eq!(Downloader::file_name("abc"), "abc.jpg");
        assert_eq!(Downloader::file_name("a/b"), "a%2Fb.jpg");
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: DownloadConfig =
            serde_json::from_str(r#"{"output_dir": "imgs"}"#).expect("parse");
        assert_eq!(config.output_dir, PathBuf::from("imgs"));
        assert_eq!(config.timeout, DEFAULT_DOWNLOAD_TIMEOUT);
    }

    #[tokio::test]
    async fn test_downloads_and_counts() {
        let server = server().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let records = vec![
            Record::new("a", format!("{}/img/a", server.uri())),
            Record::new("b", format!("{}/img/b", server.uri())),
            Record::new("gone", format!("{}/img/gone", server.uri())),
            Record::new("bad", "not a url"),
        ];

        let summary = downloader(dir.path()).download(&records).await.expect("download");

        assert_eq!(
            summary,
            DownloadSummary {
                total: 4,
                already_present: 0,
                succeeded: 2,
                failed: 2,
            }
        );
        assert_eq!(std::fs::read(dir.path().join("a.jpg")).expect("a"), b"AAAA");
        assert!(!dir.path().join("gone.jpg").exists());
    }

    #[tokio::test]
    async fn test_skips_existing_and_legacy_names() {
        let server = server().await;
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.jpg"), b"old").expect("seed");
        std::fs::write(dir.path().join(format!("flow_3_{LEGACY_KEY}.jpg")), b"old").expect("seed");

        let records = vec![
            Record::new("a", format!("{}/img/a", server.uri())),
            Record::new(LEGACY_KEY, format!("{}/img/a", server.uri())),
            Record::new("b", format!("{}/img/b", server.uri())),
            Record::new("b", format!("{}/img/b", server.uri())),
        ];

        let summary = downloader(dir.path()).download(&records).await.expect("download");

        assert_eq!(summary.already_present, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(std::fs::read(dir.path().join("a.jpg")).expect("a"), b"old");
    }

    #[tokio::test]
    async fn test_download_file_accepts_legacy_field() {
        let server = server().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = dir.path().join("export.json");
        std::fs::write(
            &artifact,
            format!(r#"[{{"key": "a", "url": "{}/img/a"}}]"#, server.uri()),
        )
        .expect("artifact");

        let out = dir.path().join("images");
        let summary = downloader(&out).download_file(&artifact).await.expect("download");

        assert_eq!(summary.succeeded, 1);
        assert!(out.join("a.jpg").exists());
    }

    #[tokio::test]
    async fn test_missing_artifact_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = downloader(dir.path())
            .download_file(dir.path().join("nope.json"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_existing_keys_on_missing_dir_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let keys = downloader(&dir.path().join("absent"))
            .existing_keys()
            .await
            .expect("keys");

        assert!(keys.is_empty());
    }
}
