use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Result;

/// The `EngineConfig` struct holds every tunable of the scrape engine: worker
/// budget, per-attempt deadline, retry policy, batching, and the extraction
/// exclusion list. Delay fields are plain milliseconds so they can be
/// overridden from a file or the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The maximum number of concurrently in-flight fetches.
    pub concurrency: usize,
    /// The deadline for a single fetch attempt, in milliseconds.
    pub request_timeout_ms: u64,
    /// The number of retries after the first failed attempt on a target.
    pub max_retries: u32,
    /// The pause between attempts on the same target, in milliseconds.
    pub retry_delay_ms: u64,
    /// The number of targets processed per batch.
    pub batch_size: usize,
    /// The idle time inserted between consecutive batches, in milliseconds.
    pub inter_batch_delay_ms: u64,
    /// The user agent string to be used in HTTP requests.
    pub user_agent: String,
    /// Exclusion substrings appended to the extractor's built-in list.
    pub extra_exclusions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: crate::DEFAULT_CONCURRENCY,
            request_timeout_ms: crate::DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            max_retries: crate::DEFAULT_MAX_RETRIES,
            retry_delay_ms: crate::DEFAULT_RETRY_DELAY.as_millis() as u64,
            batch_size: crate::DEFAULT_BATCH_SIZE,
            inter_batch_delay_ms: crate::DEFAULT_INTER_BATCH_DELAY.as_millis() as u64,
            user_agent: String::from("Mozilla/5.0 (compatible; MailsiftBot/1.0)"),
            extra_exclusions: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Loads the configuration by layering an optional `mailsift.toml` file
    /// and `MAILSIFT_*` environment variables over the defaults.
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&EngineConfig::default())?;
        let settings = Config::builder()
            .add_source(defaults)
            .add_source(File::with_name("mailsift").required(false))
            .add_source(Environment::with_prefix("MAILSIFT"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();

        assert_eq!(config.concurrency, crate::DEFAULT_CONCURRENCY);
        assert_eq!(config.max_retries, crate::DEFAULT_MAX_RETRIES);
        assert_eq!(config.request_timeout(), crate::DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.retry_delay(), crate::DEFAULT_RETRY_DELAY);
        assert_eq!(config.inter_batch_delay(), crate::DEFAULT_INTER_BATCH_DELAY);
        assert!(config.extra_exclusions.is_empty());
    }
}
