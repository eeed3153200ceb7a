//! Alert lifecycle: accumulation, read state, dismissal.

pub mod notify;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::detect::{Alert, DetectionEngine};
use crate::logs::LogEntry;
use self::notify::Notifier;

/// Shared handle used by the refresh pipeline and the API.
pub type SharedAlertStore = Arc<tokio::sync::Mutex<AlertStore>>;

/// Read-only view handed to presentation layers.
#[derive(Debug, Clone, Serialize)]
pub struct AlertSnapshot {
    pub alerts: Vec<Alert>,
    pub unread_count: usize,
}

/// In-memory alert collection, newest first, keyed by alert ID.
///
/// The store owns the detection engine so that clearing all alerts also
/// clears the engine's dedup memory; otherwise the next refresh would
/// immediately re-detect any burst still present in the batch.
pub struct AlertStore {
    engine: DetectionEngine,
    alerts: Vec<Alert>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl AlertStore {
    pub fn new(engine: DetectionEngine) -> Self {
        Self {
            engine,
            alerts: Vec::new(),
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn into_shared(self) -> SharedAlertStore {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    /// Run detection over a full batch and merge whatever fires.
    /// Returns the alerts that were actually added.
    pub fn process_logs(&mut self, batch: &[LogEntry]) -> Vec<Alert> {
        let detected = self.engine.detect(batch);
        self.merge(detected)
    }

    /// Add alerts whose IDs are not yet present, then re-sort newest first.
    /// High and critical additions are pushed to the notifier.
    pub fn merge(&mut self, new_alerts: Vec<Alert>) -> Vec<Alert> {
        let mut added = Vec::new();
        for alert in new_alerts {
            if self.alerts.iter().any(|a| a.id == alert.id) || added.iter().any(|a: &Alert| a.id == alert.id) {
                debug!(id = %alert.id, "alert already present, not merging");
                continue;
            }
            added.push(alert);
        }
        if added.is_empty() {
            return added;
        }

        self.alerts.extend(added.iter().cloned());
        self.alerts.sort_by(|a, b| b.fired_at.cmp(&a.fired_at));
        info!(added = added.len(), total = self.alerts.len(), "merged new alerts");

        if let Some(notifier) = &self.notifier {
            for alert in added.iter().filter(|a| a.severity.is_notifiable()) {
                if let Err(e) = notifier.notify(alert) {
                    warn!(id = %alert.id, error = %e, "alert notification failed");
                }
            }
        }
        added
    }

    /// Returns false if no alert has this ID.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.is_read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        for alert in &mut self.alerts {
            alert.is_read = true;
        }
    }

    /// Returns false if no alert has this ID.
    pub fn dismiss(&mut self, id: &str) -> bool {
        let before = self.alerts.len();
        self.alerts.retain(|a| a.id != id);
        self.alerts.len() != before
    }

    /// Drop every alert and reset the engine's dedup memory.
    pub fn clear_all(&mut self) {
        info!(cleared = self.alerts.len(), "clearing all alerts");
        self.alerts.clear();
        self.engine.clear_dedup_memory();
    }

    pub fn unread_count(&self) -> usize {
        self.alerts.iter().filter(|a| !a.is_read).count()
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn get(&self, id: &str) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn snapshot(&self) -> AlertSnapshot {
        AlertSnapshot {
            alerts: self.alerts.clone(),
            unread_count: self.unread_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{rules, AlertType, FixedClock, Severity};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(alert.id.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&self, _alert: &Alert) -> anyhow::Result<()> {
            anyhow::bail!("notifications not permitted")
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 30).unwrap()
    }

    fn store() -> AlertStore {
        let clock = std::sync::Arc::new(FixedClock::new(now()));
        AlertStore::new(DetectionEngine::with_clock(rules::defaults(), clock).unwrap())
    }

    fn alert(id: &str, severity: Severity, age_secs: i64) -> Alert {
        Alert {
            id: id.to_string(),
            alert_type: AlertType::SuspiciousActivity,
            severity,
            title: "t".to_string(),
            message: "m".to_string(),
            fired_at: now() - Duration::seconds(age_secs),
            event_count: 1,
            window_seconds: 60,
            source_ip: None,
            triggering_messages: Vec::new(),
            is_read: false,
        }
    }

    fn login_burst() -> Vec<LogEntry> {
        (0..6)
            .map(|i| LogEntry {
                message: format!("Failed password #{}", i),
                timestamp: now() - Duration::seconds(i),
                source_ip: "10.0.0.5".to_string(),
                classification: "login_failed".to_string(),
                confidence: 0.9,
                probabilities: None,
            })
            .collect()
    }

    #[test]
    fn test_merge_sorts_newest_first() {
        let mut store = store();
        store.merge(vec![alert("old", Severity::Low, 100), alert("new", Severity::Low, 1)]);
        store.merge(vec![alert("mid", Severity::Low, 50)]);
        let ids: Vec<&str> = store.alerts().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut store = store();
        let batch = vec![alert("a", Severity::Low, 1), alert("b", Severity::Medium, 2)];
        assert_eq!(store.merge(batch.clone()).len(), 2);
        store.mark_read("a");
        assert!(store.merge(batch.clone()).is_empty());
        assert_eq!(store.len(), 2);
        assert_eq!(store.unread_count(), 1);
        // Duplicates inside a single merge are collapsed too.
        assert_eq!(store.merge(vec![alert("c", Severity::Low, 0), alert("c", Severity::Low, 0)]).len(), 1);
    }

    #[test]
    fn test_read_state_and_unread_count() {
        let mut store = store();
        store.merge(vec![alert("a", Severity::Low, 1), alert("b", Severity::Low, 2)]);
        assert_eq!(store.unread_count(), 2);
        assert!(store.mark_read("a"));
        assert!(store.get("a").unwrap().is_read);
        assert_eq!(store.unread_count(), 1);
        assert!(!store.mark_read("missing"));
        store.mark_all_read();
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn test_dismiss_removes_alert() {
        let mut store = store();
        store.merge(vec![alert("a", Severity::Low, 1), alert("b", Severity::Low, 2)]);
        assert!(store.dismiss("a"));
        assert!(!store.dismiss("a"));
        assert_eq!(store.len(), 1);
        assert!(store.get("a").is_none());
    }

    #[test]
    fn test_notifies_only_high_and_critical() {
        let notifier = std::sync::Arc::new(RecordingNotifier::default());
        let mut store = store().with_notifier(notifier.clone());
        store.merge(vec![
            alert("low", Severity::Low, 1),
            alert("medium", Severity::Medium, 1),
            alert("high", Severity::High, 1),
            alert("critical", Severity::Critical, 1),
        ]);
        store.merge(vec![alert("high", Severity::High, 1)]);
        let mut seen = notifier.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["critical", "high"]);
    }

    #[test]
    fn test_failing_notifier_does_not_affect_state() {
        let mut store = store().with_notifier(std::sync::Arc::new(FailingNotifier));
        let added = store.merge(vec![alert("c", Severity::Critical, 1)]);
        assert_eq!(added.len(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_process_logs_dedups_across_refreshes() {
        let mut store = store();
        let added = store.process_logs(&login_burst());
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].event_count, 6);
        assert!(store.process_logs(&login_burst()).is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear_all_allows_ongoing_burst_to_realert() {
        let mut store = store();
        let first = store.process_logs(&login_burst());
        store.clear_all();
        assert!(store.is_empty());
        assert_eq!(store.engine().dedup_len(), 0);

        let again = store.process_logs(&login_burst());
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, first[0].id);
        assert_eq!(store.snapshot().unread_count, 1);
    }

    #[test]
    fn test_dismissed_alert_is_not_redetected() {
        let mut store = store();
        store.process_logs(&login_burst());
        let id = store.alerts()[0].id.clone();
        store.dismiss(&id);
        assert!(store.process_logs(&login_burst()).is_empty());
        assert!(store.is_empty());
    }
}
