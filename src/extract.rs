use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;

/// The substring pattern accepted as an email address: a permissive local
/// part, a dotted domain, and a final label of at least two letters.
const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";

/// Candidates containing any of these substrings (case-insensitive) are
/// dropped: asset filenames that merely look like addresses, placeholder
/// addresses copied from documentation, and monitoring-SDK noise.
const BUILTIN_EXCLUSIONS: &[&str] = &[
    ".png",
    ".jpg",
    ".jpeg",
    ".gif",
    ".webp",
    ".svg",
    "example.com",
    "example.org",
    "test@",
    "user@",
    "email@",
    "your@",
    "name@",
    "domain.com",
    "sentry",
    "wixpress",
];

/// The `EmailExtractor` struct scans page bodies for email addresses. It is a
/// pure function of its input: no I/O, no shared state, same body in, same
/// signals out.
pub struct EmailExtractor {
    /// The compiled address pattern.
    pattern: Regex,
    /// Exclusion substrings, lowercased for case-insensitive matching.
    exclusions: Vec<String>,
    /// Selector for `mailto:` anchors; addresses hidden behind percent
    /// encoding are only reachable through these.
    mailto_selector: Option<Selector>,
}

impl Default for EmailExtractor {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl EmailExtractor {
    /// Creates an extractor with the built-in exclusion list plus the given
    /// extra substrings.
    pub fn new(extra_exclusions: &[String]) -> Self {
        let exclusions = BUILTIN_EXCLUSIONS
            .iter()
            .map(|s| s.to_lowercase())
            .chain(extra_exclusions.iter().map(|s| s.to_lowercase()))
            .collect();

        Self {
            pattern: Regex::new(EMAIL_PATTERN).expect("email pattern is valid"),
            exclusions,
            mailto_selector: Selector::parse(r#"a[href^="mailto:"]"#).ok(),
        }
    }

    /// Extracts every admissible email address from `body`, in first-seen
    /// order, deduplicated case-insensitively. Malformed or binary input
    /// simply yields nothing.
    pub fn extract(&self, body: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for m in self.pattern.find_iter(body) {
            self.admit(m.as_str(), &mut seen, &mut found);
        }

        for candidate in self.mailto_candidates(body) {
            for m in self.pattern.find_iter(&candidate) {
                self.admit(m.as_str(), &mut seen, &mut found);
            }
        }

        found
    }

    fn admit(&self, candidate: &str, seen: &mut HashSet<String>, found: &mut Vec<String>) {
        let key = candidate.to_lowercase();
        if self.exclusions.iter().any(|x| key.contains(x)) {
            return;
        }
        if seen.insert(key) {
            found.push(candidate.to_string());
        }
    }

    /// Harvests the address part of `mailto:` anchor hrefs, percent-decoded
    /// and stripped of any `?subject=...` query.
    fn mailto_candidates(&self, body: &str) -> Vec<String> {
        let Some(selector) = &self.mailto_selector else {
            return Vec::new();
        };

        let document = Html::parse_document(body);
        document
            .select(selector)
            .filter_map(|anchor| {
                let href = anchor.value().attr("href")?;
                let raw = href.strip_prefix("mailto:")?;
                let address = raw.split('?').next().unwrap_or(raw);
                Some(
                    urlencoding::decode(address)
                        .map(|d| d.into_owned())
                        .unwrap_or_else(|_| address.to_string()),
                )
            })
            .collect()
    }
}
