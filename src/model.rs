use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One search submitted by the caller. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub keyword: String,
    pub location: String,
    pub max_results: u32,
    pub output_format: OutputFormat,
    pub output_directory: PathBuf,
    pub enable_web_scraping: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    /// Value passed to the worker's `-f` flag, also the file extension.
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

/// Coarse phase tracked by the classifier across lines of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Searching,
    Complete,
    Error,
}

/// One structured unit of progress derived from one line of worker output.
///
/// Events are transient: produced per classified line, forwarded to the
/// caller immediately, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatusEvent {
    Idle,
    SearchingMaps,
    MapsFound { count: u64 },
    ScrapingStarted { total: u64 },
    ScrapingProgress { current: u64, total: u64, label: Option<String> },
    ScrapingComplete { enhanced: u64 },
    Completed,
    NoResults,
    Error { message: String },
    Raw { message: String },
}

impl StatusEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            StatusEvent::Idle => "Idle".to_string(),
            StatusEvent::SearchingMaps => "Searching Google Maps…".to_string(),
            StatusEvent::MapsFound { count } => {
                format!("Found {} businesses", count)
            }
            StatusEvent::ScrapingStarted { total } => {
                format!("Enhancing {} businesses with website data…", total)
            }
            StatusEvent::ScrapingProgress { current, total, label } => match label {
                Some(name) => format!("[{}/{}] {}", current, total, name),
                None => format!("[{}/{}]", current, total),
            },
            StatusEvent::ScrapingComplete { enhanced } => {
                format!("Enhanced {} businesses with website data", enhanced)
            }
            StatusEvent::Completed => "Search complete".to_string(),
            StatusEvent::NoResults => "No businesses found".to_string(),
            StatusEvent::Error { message } => format!("Error: {}", message),
            StatusEvent::Raw { message } => message.clone(),
        }
    }
}

/// Per-item enhancement counter owned by one classifier instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapingProgress {
    pub current: u64,
    pub total: u64,
}

impl ScrapingProgress {
    pub fn reset(&mut self, total: u64) {
        self.current = 0;
        self.total = total;
    }

    /// Completion percentage, 0 when the total is unknown.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.current as f64 / self.total as f64) * 100.0).min(100.0) as u8
    }
}

/// One row of the result table.
///
/// Every field is always present; a source column that is missing maps to an
/// empty string, never to an absent value, so consumers need no null checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub website: String,
    pub rating: String,
    pub review_count: String,
    pub additional_phones: String,
    pub additional_emails: String,
    pub social_links: String,
}

/// Terminal result of one worker run. Constructed once at process exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub exit_code: i32,
    pub stdout_text: String,
    pub stderr_text: String,
    pub table: Option<Vec<BusinessRecord>>,
    pub output_file_path: PathBuf,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Diagnostic text for a failed run: captured stderr, or a generic
    /// message when the worker wrote nothing to stderr.
    pub fn failure_diagnostic(&self) -> String {
        let err = self.stderr_text.trim();
        if err.is_empty() {
            format!("worker exited with code {}", self.exit_code)
        } else {
            err.to_string()
        }
    }
}
