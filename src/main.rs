use anyhow::Context;
use std::io::Read;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mailsift::{EngineConfig, ScrapeEngine, Target};

/// The main entry point of the application.
///
/// Reads a JSON candidate list (`[{"label": ..., "url": ...}]`) from a file or
/// stdin, runs the scrape engine over it, and prints the signal-bearing
/// results as JSON followed by a summary.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration, falling back to defaults if the layered sources
    // fail to parse.
    let mut config = EngineConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load configuration, using defaults: {e}");
        EngineConfig::default()
    });

    let path = std::env::args()
        .nth(1)
        .context("usage: mailsift <candidates.json | -> [concurrency]")?;

    if let Some(raw) = std::env::args().nth(2) {
        config.concurrency = raw
            .parse()
            .context("concurrency must be a positive integer")?;
    }

    let raw = if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read candidates from stdin")?;
        buf
    } else {
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read candidate file {path}"))?
    };

    let targets: Vec<Target> = serde_json::from_str(&raw)
        .context("candidate list must be a JSON array of {label, url} objects")?;

    if targets.is_empty() {
        warn!("No candidates supplied, nothing to do");
        return Ok(());
    }

    info!(candidates = targets.len(), "starting scrape run");

    let engine = ScrapeEngine::new(config)?;

    // Ctrl-C asserts the shared cancellation signal; in-flight fetches
    // resolve as cancelled instead of hanging.
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling outstanding fetches");
            trigger.cancel();
        }
    });

    let start_time = Instant::now();
    let report = engine.process(targets, &cancel).await;
    let elapsed = start_time.elapsed();

    println!("{}", serde_json::to_string_pretty(&report.findings())?);

    println!("\n=== Scrape Summary ===");
    println!("Pages attempted: {}", report.attempted());
    println!("Pages fetched: {}", report.succeeded());
    println!("Pages with addresses: {}", report.with_signals());
    println!("Processing time: {:.2?}", elapsed);

    Ok(())
}
