//! Download the files referenced by an exported artifact.
//!
//! Demonstrates:
//! - Loading an artifact (current or legacy field names)
//! - Skipping files that are already present
//! - Counting successes and failures without aborting
//!
//! Usage:
//!   cargo run --example download_export -- collected_complete_120.json
//!   cargo run --example download_export -- export.json --config harvest.json
//!   cargo run --example download_export -- export.json --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use common::Args;
use scroll_harvest::{Error, Result};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Download Export ===\n");

    let artifact = args.input.clone().ok_or_else(|| {
        Error::config("Usage: cargo run --example download_export -- <artifact.json>")
    })?;

    let config = args.load_config()?;
    let downloader = config.downloader()?;

    println!("[1] Artifact: {}", artifact.display());
    println!("    Output: {}\n", downloader.config().output_dir.display());

    let summary = downloader.download_file(&artifact).await?;

    println!("\n[2] Done");
    println!("    Total: {}", summary.total);
    println!("    Already present: {}", summary.already_present);
    println!("    ✓ Downloaded: {}", summary.succeeded);
    println!("    ✗ Failed: {}", summary.failed);

    Ok(())
}
