//! Log entries as produced by the feed and annotated by the classifier.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label assigned when the classifier could not be reached for an entry.
pub const UNCLASSIFIABLE: &str = "error";

/// Label for benign traffic.
pub const NORMAL: &str = "normal";

/// Labels that surface as warnings on the dashboard.
pub const WARNING_LABELS: &[&str] = &["system_error"];

/// Labels that surface as alert-class events on the dashboard.
pub const ALERT_LABELS: &[&str] = &[
    "login_failed",
    "user_creation",
    "registry_modification",
    "privilege_escalation",
];

/// A log line as returned by the log store, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLogEntry {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
}

/// A log line annotated with its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    /// Empty when the entry was never classified.
    pub classification: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<HashMap<String, f64>>,
}

impl LogEntry {
    /// Attach a classifier verdict to a raw entry.
    pub fn classified(
        raw: RawLogEntry,
        label: impl Into<String>,
        confidence: f64,
        probabilities: Option<HashMap<String, f64>>,
    ) -> Self {
        Self {
            message: raw.message,
            timestamp: raw.timestamp,
            source_ip: raw.source_ip,
            classification: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            probabilities,
        }
    }

    /// Mark a raw entry as unclassifiable (confidence 0).
    pub fn unclassifiable(raw: RawLogEntry) -> Self {
        Self::classified(raw, UNCLASSIFIABLE, 0.0, None)
    }

    /// Whether this entry may take part in alert detection.
    pub fn is_alertable(&self) -> bool {
        !self.classification.is_empty() && self.classification != UNCLASSIFIABLE
    }

    pub fn category(&self) -> Category {
        let label = self.classification.as_str();
        if label == NORMAL {
            Category::Normal
        } else if WARNING_LABELS.contains(&label) {
            Category::Warnings
        } else if ALERT_LABELS.contains(&label) {
            Category::Alerts
        } else {
            Category::Other
        }
    }
}

/// Dashboard grouping of classification labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    All,
    Alerts,
    Warnings,
    Normal,
    Other,
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Category::All),
            "alerts" => Ok(Category::Alerts),
            "warnings" => Ok(Category::Warnings),
            "normal" => Ok(Category::Normal),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown log category '{}'", other)),
        }
    }
}

/// Entries of `batch` falling into `category`, in batch order.
pub fn filter_by_category(batch: &[LogEntry], category: Category) -> Vec<LogEntry> {
    batch
        .iter()
        .filter(|e| category == Category::All || e.category() == category)
        .cloned()
        .collect()
}

/// Per-category counts over one classified batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogStats {
    pub total: usize,
    pub normal: usize,
    pub warnings: usize,
    pub alerts: usize,
    pub unclassifiable: usize,
}

impl LogStats {
    pub fn from_batch(batch: &[LogEntry]) -> Self {
        let mut stats = LogStats {
            total: batch.len(),
            ..Default::default()
        };
        for entry in batch {
            if entry.classification == UNCLASSIFIABLE {
                stats.unclassifiable += 1;
                continue;
            }
            match entry.category() {
                Category::Normal => stats.normal += 1,
                Category::Warnings => stats.warnings += 1,
                Category::Alerts => stats.alerts += 1,
                Category::All | Category::Other => {}
            }
        }
        stats
    }

    /// Share of `count` in the batch, as a percentage with one decimal.
    pub fn percent(&self, count: usize) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let pct = count as f64 * 100.0 / self.total as f64;
        (pct * 10.0).round() / 10.0
    }
}

/// Parse a log store timestamp.
///
/// Accepts RFC 3339 and the Graylog `YYYY-MM-DD HH:MM:SS[.fff]` form, which
/// is always UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
