//! Harvest records from a live page through the WebSocket bridge.
//!
//! Demonstrates:
//! - Binding a bridge server and printing the in-page script
//! - Attaching the page and routing its responses into a collector
//! - Running the driver until stall, attempt cap or Ctrl+C
//! - Exporting on every stop path
//!
//! Usage:
//!   cargo run --example bridge_harvest
//!   cargo run --example bridge_harvest -- --config harvest.json
//!   cargo run --example bridge_harvest -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use common::Args;
use scroll_harvest::bridge::BridgeServer;
use scroll_harvest::{Collector, Driver, ExportOutcome, Result, StopOutcome};

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
    println!("=== Bridge Harvest ===\n");

    let config = args.load_config()?;
    println!("[1] Export directory: {}", config.export_dir.display());
    println!(
        "    Poll {}ms, at most {} attempts, stop after {} idle polls\n",
        config.run.poll_interval.as_millis(),
        config.run.max_attempts,
        config.run.stall_threshold
    );

    // ========================================================================
    // Bridge
    // ========================================================================

    let server = BridgeServer::bind_local().await?;
    println!("[2] Bridge listening on {}", server.ws_url());
    println!("    Paste this into the page's devtools console:\n");
    println!("{}\n", server.script());

    let collector = Arc::new(Collector::new());
    let page = server.attach(config.interceptor(Arc::clone(&collector))).await?;
    println!("    ✓ Page attached: {}\n", page.ready().url);

    // ========================================================================
    // Run
    // ========================================================================

    let interceptor = page.interceptor().clone();
    let connection = page.connection().clone();
    let driver = Driver::builder()
        .config(config.run)
        .interceptor(interceptor)
        .advancer(page)
        .exporter(config.exporter())
        .build()?;

    println!("[3] Running (Ctrl+C stops and exports)...\n");
    let task = driver.start()?;
    let wait = task.wait();
    tokio::pin!(wait);

    let report = tokio::select! {
        report = &mut wait => report,
        _ = tokio::signal::ctrl_c() => {
            match driver.stop()? {
                StopOutcome::Stopped(outcome) => println!("\n    Stopped: {outcome}"),
                other => println!("\n    {other:?}"),
            }
            (&mut wait).await
        }
    };
    connection.shutdown();
    let report = report?;

    println!("[4] {}", report.reason);
    println!("    Attempts: {}", report.attempts);
    println!("    Records: {}", report.records);
    println!("    Requests observed: {}", report.requests_observed);
    match report.export {
        Some(ExportOutcome::Written(summary)) => {
            println!("    ✓ Exported {}", summary.artifact.location);
        }
        _ => println!("    Nothing exported"),
    }
    if let Some(message) = report.export_error {
        println!("    ✗ Export failed: {message}");
    }

    Ok(())
}
