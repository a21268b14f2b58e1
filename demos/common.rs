//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line argument parsing
//! - Logging initialization
//! - Config loading with a home-directory fallback

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;

use scroll_harvest::{HarvestConfig, Result};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Path Helpers
// ============================================================================

/// Default output directory under $HOME.
pub fn default_output_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scroll-harvest")
}

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub debug: bool,
    pub config: Option<PathBuf>,
    /// First argument that is neither a flag nor a flag value.
    pub input: Option<PathBuf>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse() -> Self {
        let mut parsed = Self::default();
        let mut args = std::env::args().skip(1);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--debug" => parsed.debug = true,
                "--config" => parsed.config = args.next().map(PathBuf::from),
                _ if parsed.input.is_none() && !arg.starts_with("--") => {
                    parsed.input = Some(PathBuf::from(arg));
                }
                _ => {}
            }
        }

        parsed
    }

    /// Loads `--config`, or defaults writing under [`default_output_dir`].
    pub fn load_config(&self) -> Result<HarvestConfig> {
        match &self.config {
            Some(path) => HarvestConfig::from_json_file(path),
            None => {
                let dir = default_output_dir();
                let mut config = HarvestConfig {
                    export_dir: dir.clone(),
                    ..HarvestConfig::default()
                };
                config.download.output_dir = dir.join("images");
                Ok(config)
            }
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "scroll_harvest=debug"
    } else {
        "scroll_harvest=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
