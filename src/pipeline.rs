//! One refresh cycle: fetch → classify → detect → merge.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::alerts::SharedAlertStore;
use crate::detect::Alert;
use crate::logs::{LogEntry, LogStats};
use crate::scheduler::RefreshAction;
use crate::source::batch::classify_batch;
use crate::source::{Classifier, LogFeed};

/// Outcome of the most recent refresh attempts, for telling apart
/// "no alerts yet", "last refresh failed" and "classifier degraded".
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStatus {
    /// When the current batch was fetched; `None` before the first success.
    pub fetched_at: Option<DateTime<Utc>>,
    pub stats: LogStats,
    /// Entries the feed discarded, e.g. for unparseable timestamps.
    pub dropped: usize,
    /// At least one entry of the current batch could not be classified.
    pub classifier_degraded: bool,
    pub new_alerts: usize,
    /// Set when the latest attempt failed; cleared by the next success.
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

/// The latest complete classified batch and its status.
#[derive(Debug, Clone, Default)]
pub struct LastBatch {
    pub entries: Vec<LogEntry>,
    pub status: BatchStatus,
}

pub type SharedBatch = Arc<RwLock<LastBatch>>;

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub fetched: usize,
    pub unclassifiable: usize,
    pub new_alerts: Vec<Alert>,
}

impl CycleReport {
    pub fn summary(&self) -> String {
        format!(
            "{} logs fetched, {} unclassifiable, {} new alerts",
            self.fetched,
            self.unclassifiable,
            self.new_alerts.len()
        )
    }
}

/// The refresh action driven by the scheduler.
pub struct LogRefresh {
    feed: Arc<dyn LogFeed>,
    classifier: Arc<dyn Classifier>,
    alerts: SharedAlertStore,
    batch: SharedBatch,
    log_limit: usize,
    concurrency: usize,
}

impl LogRefresh {
    pub fn new(
        feed: Arc<dyn LogFeed>,
        classifier: Arc<dyn Classifier>,
        alerts: SharedAlertStore,
        log_limit: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            feed,
            classifier,
            alerts,
            batch: Arc::new(RwLock::new(LastBatch::default())),
            log_limit,
            concurrency,
        }
    }

    pub fn batch(&self) -> SharedBatch {
        self.batch.clone()
    }

    pub fn alerts(&self) -> SharedAlertStore {
        self.alerts.clone()
    }

    /// Run one full cycle. A feed failure aborts the cycle and leaves the
    /// previous batch and all alerts untouched.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let raw = match self.feed.fetch_recent_logs(self.log_limit).await {
            Ok(raw) => raw,
            Err(e) => {
                let mut batch = self.batch.write().await;
                batch.status.last_error = Some(e.to_string());
                batch.status.last_error_at = Some(Utc::now());
                return Err(e).context("refresh aborted");
            }
        };
        let fetched = raw.len();
        let dropped = self.feed.last_fetch_dropped();
        if dropped > 0 {
            warn!(dropped, "log feed discarded unusable entries");
        }

        let entries = classify_batch(self.classifier.as_ref(), raw, self.concurrency).await;
        let stats = LogStats::from_batch(&entries);
        if stats.unclassifiable > 0 {
            warn!(
                unclassifiable = stats.unclassifiable,
                total = stats.total,
                "classifier degraded for this batch"
            );
        }

        let new_alerts = self.alerts.lock().await.process_logs(&entries);

        let report = CycleReport {
            fetched,
            unclassifiable: stats.unclassifiable,
            new_alerts,
        };

        let mut batch = self.batch.write().await;
        batch.status = BatchStatus {
            fetched_at: Some(Utc::now()),
            dropped,
            classifier_degraded: stats.unclassifiable > 0,
            new_alerts: report.new_alerts.len(),
            stats,
            last_error: None,
            last_error_at: None,
        };
        batch.entries = entries;

        info!(
            fetched = report.fetched,
            unclassifiable = report.unclassifiable,
            new_alerts = report.new_alerts.len(),
            "refresh cycle complete"
        );
        Ok(report)
    }
}

#[async_trait::async_trait]
impl RefreshAction for LogRefresh {
    async fn refresh(&self) -> Result<String> {
        self.run_cycle().await.map(|report| report.summary())
    }
}
