use std::time::Duration;
use thiserror::Error;

pub mod config;
pub mod engine;
pub mod extract;
pub mod fetch;
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::ScrapeEngine;
pub use extract::EmailExtractor;
pub use fetch::{Fetcher, HttpFetcher};
pub use types::{BatchReport, ExtractionResult, FetchOutcome, RunReport, Target};

/// The `ScrapeError` enum represents the errors that can occur in the scraper.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Represents an error that occurs while building or using the HTTP client.
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Represents an error that occurs while loading configuration.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ::config::ConfigError),
}

/// A type alias for `Result` with the `ScrapeError` error type.
pub type Result<T> = std::result::Result<T, ScrapeError>;

// Constants

/// The default number of concurrently in-flight fetches.
pub const DEFAULT_CONCURRENCY: usize = 10;
/// The default per-attempt deadline for a fetch.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// The default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// The default pause between attempts on the same target.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// The default number of targets processed per batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;
/// The default idle time inserted between consecutive batches.
pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_secs(3);
/// The upper bound of the jittered pre-start delay per target, in milliseconds.
pub const JITTER_CEILING_MS: u64 = 200;
