//! Scatter/gather classification of a fetched batch.

use futures::stream::{self, StreamExt};
use tracing::warn;

use super::Classifier;
use crate::logs::{LogEntry, RawLogEntry};

/// Classify every entry with at most `concurrency` requests in flight.
///
/// Output order matches input order regardless of completion order. An
/// entry whose classification fails becomes unclassifiable instead of
/// failing the batch.
pub async fn classify_batch(
    classifier: &dyn Classifier,
    entries: Vec<RawLogEntry>,
    concurrency: usize,
) -> Vec<LogEntry> {
    stream::iter(entries)
        .map(move |raw| async move {
            match classifier.classify(&raw.message).await {
                Ok(verdict) => {
                    LogEntry::classified(raw, verdict.label, verdict.confidence, verdict.probabilities)
                }
                Err(e) => {
                    warn!(error = %e, source_ip = %raw.source_ip, "classification failed, marking entry unclassifiable");
                    LogEntry::unclassifiable(raw)
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}
