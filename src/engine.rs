use chrono::Utc;
use futures::{stream, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    BatchReport, EmailExtractor, EngineConfig, ExtractionResult, FetchOutcome, Fetcher,
    HttpFetcher, Result, RunReport, Target,
};

/// The `ScrapeEngine` struct drives candidate targets through fetch, retry,
/// and extraction under a fixed worker budget. It is an explicitly
/// constructed, caller-owned value; independent engines with different
/// configurations can run concurrently.
pub struct ScrapeEngine {
    /// The fetch capability; swapped for a deterministic fake in tests.
    fetcher: Arc<dyn Fetcher>,
    /// The pure signal extractor applied to successful bodies.
    extractor: EmailExtractor,
    /// The configuration settings for the engine.
    config: EngineConfig,
    /// The progress bars used to display batch progress.
    progress: MultiProgress,
}

impl ScrapeEngine {
    /// Creates an engine backed by a real HTTP fetcher.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Creates an engine with an explicit fetch capability.
    pub fn with_fetcher(config: EngineConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let extractor = EmailExtractor::new(&config.extra_exclusions);

        Self {
            fetcher,
            extractor,
            config,
            progress: MultiProgress::new(),
        }
    }

    /// Resolves one target to its result: up to `max_retries + 1` attempts,
    /// retrying only outcomes another attempt could change, with a
    /// cancellable constant delay between attempts. Every path ends in a
    /// well-formed `ExtractionResult`; nothing escapes this layer.
    pub async fn resolve(&self, target: Target, cancel: &CancellationToken) -> ExtractionResult {
        let deadline = self.config.request_timeout();
        let attempts = self.config.max_retries + 1;
        let mut last = None;

        for attempt in 1..=attempts {
            let outcome = self.fetcher.fetch(&target, deadline, cancel).await;

            match outcome {
                FetchOutcome::Success { status, body } => {
                    let signals = self.extractor.extract(&body);
                    debug!(
                        url = %target.url,
                        status,
                        signals = signals.len(),
                        "fetched successfully"
                    );
                    return ExtractionResult::success(target, signals);
                }
                other => {
                    debug!(
                        url = %target.url,
                        attempt,
                        outcome = %other.describe(),
                        "fetch attempt failed"
                    );
                    let retryable = other.is_retryable();
                    last = Some(other);

                    if !retryable {
                        break;
                    }
                    if attempt < attempts {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                last = Some(FetchOutcome::Cancelled);
                                break;
                            }
                            _ = sleep(self.config.retry_delay()) => {}
                        }
                    }
                }
            }
        }

        let error = last
            .map(|o| o.describe())
            .unwrap_or_else(|| "no attempt made".to_string());
        ExtractionResult::failure(target, error)
    }

    /// Runs one batch with sliding-window admission: at most `concurrency`
    /// targets in flight, the next admitted as soon as any completes. Every
    /// target yields exactly one result; intra-batch order is completion
    /// order.
    pub async fn run_batch(
        &self,
        targets: Vec<Target>,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let total = targets.len();

        let pb = self.progress.add(ProgressBar::new(total as u64));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap(),
        );

        let results = stream::iter(targets)
            .map(|target| {
                let pb = pb.clone();
                async move {
                    // Jittered start to avoid hammering related hosts at
                    // once. Politeness only; correctness never depends on it.
                    let jitter = rand::thread_rng().gen_range(0..=crate::JITTER_CEILING_MS);
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sleep(Duration::from_millis(jitter)) => {}
                    }

                    pb.set_message(target.url.clone());
                    let result = self.resolve(target, cancel).await;
                    pb.inc(1);
                    result
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let report = BatchReport { results };
        pb.finish_with_message(format!(
            "{} of {} pages fetched, {} with addresses",
            report.succeeded(),
            total,
            report.with_signals()
        ));

        report
    }

    /// Processes the whole candidate list: consecutive `batch_size` chunks,
    /// strictly sequential, with a cancellable pause between chunks. The run
    /// always completes with a report; one chunk's troubles never abort the
    /// rest.
    pub async fn process(&self, targets: Vec<Target>, cancel: &CancellationToken) -> RunReport {
        let started_at = Utc::now();
        let chunk_size = self.config.batch_size.max(1);
        let chunks: Vec<Vec<Target>> = targets.chunks(chunk_size).map(|c| c.to_vec()).collect();
        let chunk_count = chunks.len();

        let mut batches = Vec::with_capacity(chunk_count);

        for (index, chunk) in chunks.into_iter().enumerate() {
            info!(
                batch = index + 1,
                of = chunk_count,
                size = chunk.len(),
                "processing batch"
            );

            let report = self.run_batch(chunk, cancel).await;
            info!(
                batch = index + 1,
                attempted = report.attempted(),
                succeeded = report.succeeded(),
                with_signals = report.with_signals(),
                "batch finished"
            );
            batches.push(report);

            // Pause between chunks, skipped after the last one and once
            // cancellation has been requested.
            if index + 1 < chunk_count && !cancel.is_cancelled() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = sleep(self.config.inter_batch_delay()) => {}
                }
            }
        }

        let report = RunReport {
            batches,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            attempted = report.attempted(),
            succeeded = report.succeeded(),
            with_signals = report.with_signals(),
            "run complete"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn quick_config() -> EngineConfig {
        EngineConfig {
            concurrency: 5,
            request_timeout_ms: 50,
            max_retries: 2,
            retry_delay_ms: 1,
            batch_size: 50,
            inter_batch_delay_ms: 1,
            ..EngineConfig::default()
        }
    }

    /// Always classifies the attempt the same way, counting invocations.
    struct ScriptedFetcher {
        outcome: FetchOutcome,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(outcome: FetchOutcome) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            _target: &Target,
            _deadline: Duration,
            cancel: &CancellationToken,
        ) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if cancel.is_cancelled() {
                return FetchOutcome::Cancelled;
            }
            self.outcome.clone()
        }
    }

    /// Succeeds after a fixed delay, tracking peak concurrency.
    struct SlowFetcher {
        delay: Duration,
        body: String,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowFetcher {
        fn new(delay: Duration, body: &str) -> Self {
            Self {
                delay,
                body: body.to_string(),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for SlowFetcher {
        async fn fetch(
            &self,
            _target: &Target,
            _deadline: Duration,
            cancel: &CancellationToken,
        ) -> FetchOutcome {
            if cancel.is_cancelled() {
                return FetchOutcome::Cancelled;
            }

            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let outcome = tokio::select! {
                _ = cancel.cancelled() => FetchOutcome::Cancelled,
                _ = sleep(self.delay) => FetchOutcome::Success {
                    status: 200,
                    body: self.body.clone(),
                },
            };

            self.active.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }

    fn targets(n: usize) -> Vec<Target> {
        (0..n)
            .map(|i| Target::new(format!("t{i}"), format!("https://host{i}.test")))
            .collect()
    }

    #[tokio::test]
    async fn test_timeout_is_retried_until_exhaustion() {
        let fetcher = Arc::new(ScriptedFetcher::new(FetchOutcome::Timeout));
        let engine = ScrapeEngine::with_fetcher(quick_config(), fetcher.clone());

        let result = engine
            .resolve(
                Target::new("a", "https://a.test"),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert!(!result.succeeded);
        assert!(result.signals.is_empty());
        assert_eq!(result.error.as_deref(), Some("timed out"));
    }

    #[tokio::test]
    async fn test_http_error_is_terminal() {
        let fetcher = Arc::new(ScriptedFetcher::new(FetchOutcome::HttpError { status: 404 }));
        let engine = ScrapeEngine::with_fetcher(quick_config(), fetcher.clone());

        let result = engine
            .resolve(
                Target::new("a", "https://a.test"),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(!result.succeeded);
        assert_eq!(result.error.as_deref(), Some("http status 404"));
    }

    #[tokio::test]
    async fn test_invalid_target_is_terminal() {
        let fetcher = Arc::new(ScriptedFetcher::new(FetchOutcome::Invalid {
            reason: "unsupported url scheme".to_string(),
        }));
        let engine = ScrapeEngine::with_fetcher(quick_config(), fetcher.clone());

        let result = engine
            .resolve(Target::new("a", "nota-url"), &CancellationToken::new())
            .await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(!result.succeeded);
    }

    #[tokio::test]
    async fn test_success_extracts_signals() {
        let fetcher = Arc::new(ScriptedFetcher::new(FetchOutcome::Success {
            status: 200,
            body: "mail contact@acme.io or logo@2x.png".to_string(),
        }));
        let engine = ScrapeEngine::with_fetcher(quick_config(), fetcher);

        let result = engine
            .resolve(
                Target::new("a", "https://a.test"),
                &CancellationToken::new(),
            )
            .await;

        assert!(result.succeeded);
        assert_eq!(result.signals, vec!["contact@acme.io"]);
    }

    #[tokio::test]
    async fn test_batch_respects_concurrency_limit() {
        let fetcher = Arc::new(SlowFetcher::new(Duration::from_millis(30), ""));
        let engine = ScrapeEngine::with_fetcher(quick_config(), fetcher.clone());

        let report = engine
            .run_batch(targets(20), &CancellationToken::new())
            .await;

        assert_eq!(report.attempted(), 20);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 5);

        let labels: HashSet<_> = report.results.iter().map(|r| &r.target.label).collect();
        assert_eq!(labels.len(), 20, "every target yields exactly one result");
    }

    #[tokio::test]
    async fn test_cancellation_completes_without_hanging() {
        let fetcher = Arc::new(SlowFetcher::new(Duration::from_secs(30), ""));
        let engine = ScrapeEngine::with_fetcher(quick_config(), fetcher);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            engine.run_batch(targets(20), &cancel),
        )
        .await
        .expect("cancelled run must still complete");

        assert_eq!(report.attempted(), 20);
        assert!(report.results.iter().all(|r| !r.succeeded));
        assert!(report
            .results
            .iter()
            .all(|r| r.error.as_deref() == Some("cancelled")));
    }

    #[tokio::test]
    async fn test_rearmed_token_allows_a_fresh_run() {
        let fetcher = Arc::new(ScriptedFetcher::new(FetchOutcome::Success {
            status: 200,
            body: "hello@acme.io".to_string(),
        }));
        let engine = ScrapeEngine::with_fetcher(quick_config(), fetcher);

        let first = CancellationToken::new();
        first.cancel();
        let cancelled = engine.run_batch(targets(2), &first).await;
        assert_eq!(cancelled.succeeded(), 0);

        let second = CancellationToken::new();
        let fresh = engine.run_batch(targets(2), &second).await;
        assert_eq!(fresh.succeeded(), 2);
    }

    #[tokio::test]
    async fn test_orchestrator_chunks_sequentially_with_pause() {
        let fetcher = Arc::new(SlowFetcher::new(Duration::from_millis(1), ""));
        let mut config = quick_config();
        config.batch_size = 2;
        config.inter_batch_delay_ms = 150;
        let engine = ScrapeEngine::with_fetcher(config, fetcher);

        let start = Instant::now();
        let report = engine.process(targets(5), &CancellationToken::new()).await;
        let elapsed = start.elapsed();

        let sizes: Vec<usize> = report.batches.iter().map(BatchReport::attempted).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(
            elapsed >= Duration::from_millis(300),
            "two inter-batch pauses must be observed, got {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_zero_signal_results_counted_but_filtered() {
        struct SplitFetcher;

        #[async_trait]
        impl Fetcher for SplitFetcher {
            async fn fetch(
                &self,
                target: &Target,
                _deadline: Duration,
                _cancel: &CancellationToken,
            ) -> FetchOutcome {
                let body = if target.label == "rich" {
                    "say hi at hi@acme.io".to_string()
                } else {
                    "nothing to see".to_string()
                };
                FetchOutcome::Success { status: 200, body }
            }
        }

        let engine = ScrapeEngine::with_fetcher(quick_config(), Arc::new(SplitFetcher));
        let report = engine
            .process(
                vec![
                    Target::new("rich", "https://rich.test"),
                    Target::new("bare", "https://bare.test"),
                ],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.attempted(), 2);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.with_signals(), 1);

        let findings = report.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].target.label, "rich");
        assert_eq!(findings[0].signals, vec!["hi@acme.io"]);
    }
}
