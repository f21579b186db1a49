use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A candidate page to scrape: an opaque label plus the address to fetch.
/// Immutable once created; discarded after its result is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// A human-readable identifier, typically the page title from the search collaborator.
    pub label: String,
    /// The address to fetch.
    pub url: String,
}

impl Target {
    /// Creates a new `Target` from a label and a URL.
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// The classified outcome of a single fetch attempt. Produced once per attempt,
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The server responded with a success status and the body was fully read.
    Success { status: u16, body: String },
    /// The server responded with a non-success status; the body was not read.
    HttpError { status: u16 },
    /// No response arrived within the attempt deadline.
    Timeout,
    /// The attempt failed at the transport level.
    NetworkError { cause: String },
    /// The shared cancellation signal was asserted before or during the attempt.
    Cancelled,
    /// The target was rejected before any network attempt was made.
    Invalid { reason: String },
}

impl FetchOutcome {
    /// Whether another attempt on the same target may succeed. `HttpError`
    /// means the server answered, so retrying it is pointless; `Cancelled`
    /// and `Invalid` are terminal by definition.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::NetworkError { .. })
    }

    /// A short description of the outcome for result errors and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Success { status, .. } => format!("success ({status})"),
            Self::HttpError { status } => format!("http status {status}"),
            Self::Timeout => "timed out".to_string(),
            Self::NetworkError { cause } => format!("network error: {cause}"),
            Self::Cancelled => "cancelled".to_string(),
            Self::Invalid { reason } => format!("invalid target: {reason}"),
        }
    }
}

/// The per-target output of the engine: the extracted signals plus whether the
/// fetch ultimately succeeded. Exactly one is produced per target per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// The target this result belongs to.
    pub target: Target,
    /// Extracted signal values, first-seen order, deduplicated case-insensitively.
    pub signals: Vec<String>,
    /// True when a fetch attempt succeeded, even if no signals were found.
    pub succeeded: bool,
    /// The last failure's classification when `succeeded` is false.
    pub error: Option<String>,
}

impl ExtractionResult {
    /// A successful fetch, possibly with an empty signal list.
    pub fn success(target: Target, signals: Vec<String>) -> Self {
        Self {
            target,
            signals,
            succeeded: true,
            error: None,
        }
    }

    /// A target that never produced a readable body.
    pub fn failure(target: Target, error: impl Into<String>) -> Self {
        Self {
            target,
            signals: Vec::new(),
            succeeded: false,
            error: Some(error.into()),
        }
    }

    /// Whether this result carries at least one signal.
    pub fn has_signals(&self) -> bool {
        !self.signals.is_empty()
    }
}

/// The results of one batch. Intra-batch order is completion order, not input
/// order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<ExtractionResult>,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded).count()
    }

    pub fn with_signals(&self) -> usize {
        self.results.iter().filter(|r| r.has_signals()).count()
    }

    /// The results worth keeping: those that yielded at least one signal.
    pub fn signal_bearing(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.results.iter().filter(|r| r.has_signals())
    }
}

/// The aggregated output of a whole orchestration run. Batch order is
/// preserved; no entity in it persists beyond the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub batches: Vec<BatchReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn attempted(&self) -> usize {
        self.batches.iter().map(BatchReport::attempted).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.batches.iter().map(BatchReport::succeeded).sum()
    }

    pub fn with_signals(&self) -> usize {
        self.batches.iter().map(BatchReport::with_signals).sum()
    }

    /// The signal-bearing results across all batches, in batch order. This is
    /// the collection handed to the export collaborator: sites with findable
    /// signal, not all attempted sites.
    pub fn findings(&self) -> Vec<&ExtractionResult> {
        self.batches
            .iter()
            .flat_map(|b| b.signal_bearing())
            .collect()
    }
}
