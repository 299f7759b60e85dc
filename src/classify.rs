//! Free-text status classification.
//!
//! The worker's stdout protocol is free-form log lines with overlapping
//! vocabulary, so classification is an explicit ordered rule list evaluated
//! top to bottom: the first matching rule wins and ordering is part of the
//! contract. Specific patterns come first; the generic error catch-all sits
//! between the startup rules and the progress rules so that a progress line
//! containing "failed" is reported as an error rather than as progress.
//!
//! One classifier instance per run: the progress counter and coarse phase
//! are not safe to share across concurrent searches.

use crate::model::{Phase, ScrapingProgress, StatusEvent};
use regex::Regex;
use std::sync::OnceLock;

fn found_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Found (\d+) businesses").expect("valid regex"))
}

fn enhanced_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Enhanced (\d+) businesses with website data").expect("valid regex")
    })
}

fn scraping_started_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:Enhancing|Scraping)\s+(\d+)\s+businesses").expect("valid regex"))
}

fn processing_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Processing:\s*(.+?)(?:\.\.\.)?\s*$").expect("valid regex"))
}

fn enhancing_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:Enhancing|Scraping)\s+(.+?)(?:\.\.\.)?\s*$").expect("valid regex")
    })
}

fn capture_u64(re: &Regex, line: &str) -> Option<u64> {
    re.captures(line)?.get(1)?.as_str().parse().ok()
}

fn capture_name(re: &Regex, line: &str) -> Option<String> {
    // Trailing dots are ellipsis from the worker's log style, not part of
    // the business name.
    let name = re.captures(line)?.get(1)?.as_str().trim().trim_end_matches('.');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Turns one line of worker output into zero or one [`StatusEvent`] and
/// maintains the running scraping counter across calls.
#[derive(Debug)]
pub struct StatusClassifier {
    progress: ScrapingProgress,
    phase: Phase,
    sub_label: Option<String>,
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusClassifier {
    pub fn new() -> Self {
        Self {
            progress: ScrapingProgress::default(),
            phase: Phase::Idle,
            sub_label: None,
        }
    }

    pub fn progress(&self) -> ScrapingProgress {
        self.progress
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Transient sub-label shown under the main progress line, e.g.
    /// "Finalizing results…" while the worker flushes its output file.
    pub fn sub_label(&self) -> Option<&str> {
        self.sub_label.as_deref()
    }

    /// Classify one line, in arrival order. Never fails: an unrecognized
    /// line degrades to `Raw` while a search is underway, or is dropped.
    pub fn classify(&mut self, line: &str) -> Option<StatusEvent> {
        let line = line.trim_end();
        if line.is_empty() {
            return None;
        }

        // Rule 1: search start.
        if line.contains("Searching for") && line.contains(" in ") {
            self.phase = Phase::Searching;
            return Some(StatusEvent::SearchingMaps);
        }

        // Rule 2: configuration echoes, suppressed.
        if line.contains("Max results:") || line.contains("Web scraping:") {
            return None;
        }

        // Rule 3: error catch-all, ahead of the progress rules so that a
        // line carrying both a progress keyword and "failed" is reported as
        // an error. Known sharp edge: a business name containing "failed"
        // is misclassified here; kept as documented behavior.
        let lower = line.to_lowercase();
        if lower.contains("error") || lower.contains("failed") {
            self.phase = Phase::Error;
            return Some(StatusEvent::Error {
                message: line.to_string(),
            });
        }

        // Rule 4: maps lookup finished; resets the scraping counter.
        if let Some(count) = capture_u64(found_re(), line) {
            self.progress.reset(count);
            return Some(StatusEvent::MapsFound { count });
        }

        // Rule 5: enhancement summary (past tense, before the per-item rule
        // which would otherwise swallow it).
        if let Some(enhanced) = capture_u64(enhanced_re(), line) {
            return Some(StatusEvent::ScrapingComplete { enhanced });
        }

        // Rule 6: per-item enhancement progress.
        if line.contains("Enhancing") || line.contains("Scraping") || line.contains("Processing:") {
            // "Enhancing N businesses…" announces the batch, not an item.
            if let Some(total) = capture_u64(scraping_started_re(), line) {
                self.progress.reset(total);
                return Some(StatusEvent::ScrapingStarted { total });
            }
            let label = capture_name(processing_name_re(), line)
                .or_else(|| capture_name(enhancing_name_re(), line));
            if label.is_some() || self.progress.total > 0 {
                self.progress.current += 1;
                return Some(StatusEvent::ScrapingProgress {
                    current: self.progress.current,
                    total: self.progress.total,
                    label,
                });
            }
            return Some(StatusEvent::Raw {
                message: line.to_string(),
            });
        }

        // Rule 7: output flush notice; no discrete event, only a sub-label
        // while a search is underway.
        if line.contains("Results saved to:") {
            if self.phase == Phase::Searching {
                self.sub_label = Some("Finalizing results…".to_string());
            }
            return None;
        }

        // Rule 8: empty result set.
        if line.contains("No businesses found") {
            return Some(StatusEvent::NoResults);
        }

        // Rule 9: generic progress text while searching; dropped otherwise.
        if self.phase == Phase::Searching {
            return Some(StatusEvent::Raw {
                message: line.to_string(),
            });
        }
        None
    }
}
