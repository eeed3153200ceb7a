use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::detect::clock::{Clock, SystemClock};
use crate::detect::rules::{self, AlertRule};
use crate::detect::{Alert, AlertType, DetectError};
use crate::logs::LogEntry;

/// Width of the time bucket folded into alert IDs.
pub const ALERT_ID_BUCKET_SECS: i64 = 300;

/// Entries of one classification, split per source IP in first-seen order.
type IpGroups<'a> = Vec<(&'a str, Vec<&'a LogEntry>)>;

/// Evaluates the rule table against full log batches.
///
/// The engine remembers every alert ID it has emitted and never emits the
/// same ID twice until [`DetectionEngine::clear_dedup_memory`] is called.
/// IDs are `{type}-{ip}-{count}-{bucket}` where `bucket` is the current
/// time floored to [`ALERT_ID_BUCKET_SECS`], so an ongoing burst collapses
/// into one alert per bucket and per distinct event count.
pub struct DetectionEngine {
    rules: Vec<AlertRule>,
    clock: Arc<dyn Clock>,
    emitted: HashSet<String>,
}

impl DetectionEngine {
    /// Build an engine on the system clock. Fails if the rule table is invalid.
    pub fn new(rules: Vec<AlertRule>) -> Result<Self, DetectError> {
        Self::with_clock(rules, Arc::new(SystemClock))
    }

    pub fn with_clock(rules: Vec<AlertRule>, clock: Arc<dyn Clock>) -> Result<Self, DetectError> {
        rules::validate(&rules)?;
        Ok(Self {
            rules,
            clock,
            emitted: HashSet::new(),
        })
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Number of alert IDs currently remembered.
    pub fn dedup_len(&self) -> usize {
        self.emitted.len()
    }

    /// Forget every emitted alert ID so ongoing bursts may fire again.
    pub fn clear_dedup_memory(&mut self) {
        debug!(forgotten = self.emitted.len(), "clearing alert dedup memory");
        self.emitted.clear();
    }

    /// Run every rule against the current batch and return the alerts that
    /// have not been emitted before, in rule-table order.
    pub fn detect(&mut self, batch: &[LogEntry]) -> Vec<Alert> {
        let now = self.clock.now();
        let bucket = now.timestamp().div_euclid(ALERT_ID_BUCKET_SECS);
        let groups = group_by_classification_and_ip(batch);
        let mut fired = Vec::new();

        for rule in &self.rules {
            let Some(ip_groups) = groups.get(rule.watched_classification.as_str()) else {
                continue;
            };
            let cutoff = window_start(now, rule.window_seconds);

            for (ip, entries) in ip_groups {
                let recent: Vec<&LogEntry> = entries
                    .iter()
                    .copied()
                    .filter(|e| cutoff.map_or(true, |c| e.timestamp >= c))
                    .collect();
                let count = recent.len();
                if count < rule.threshold {
                    continue;
                }

                let id = alert_id(rule.rule_type, ip, count, bucket);
                if !self.emitted.insert(id.clone()) {
                    debug!(%id, "burst already reported");
                    continue;
                }

                info!(%id, rule = %rule.rule_type, %ip, count, severity = %rule.severity, "burst detected");
                fired.push(Alert {
                    id,
                    alert_type: rule.rule_type,
                    severity: rule.severity,
                    title: rule.render_title(count, ip),
                    message: rule.render_message(count, ip),
                    fired_at: now,
                    event_count: count,
                    window_seconds: rule.window_seconds,
                    source_ip: Some(ip.to_string()),
                    triggering_messages: recent.iter().map(|e| e.message.clone()).collect(),
                    is_read: false,
                });
            }
        }

        fired
    }
}

/// Earliest timestamp inside a window ending at `now`. `None` when the
/// window reaches past the representable range, meaning no cutoff.
fn window_start(now: DateTime<Utc>, window_seconds: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(window_seconds).ok()?;
    now.checked_sub_signed(Duration::try_seconds(secs)?)
}

pub fn alert_id(rule_type: AlertType, ip: &str, count: usize, bucket: i64) -> String {
    format!("{}-{}-{}-{}", rule_type, ip, count, bucket)
}

/// Group alertable entries by classification, then by source IP.
/// Unclassified and unclassifiable entries are skipped.
fn group_by_classification_and_ip(batch: &[LogEntry]) -> HashMap<&str, IpGroups<'_>> {
    let mut groups: HashMap<&str, IpGroups<'_>> = HashMap::new();
    let mut slots: HashMap<(&str, &str), usize> = HashMap::new();

    for entry in batch.iter().filter(|e| e.is_alertable()) {
        let label = entry.classification.as_str();
        let ip = entry.source_ip.as_str();
        let ip_groups = groups.entry(label).or_default();
        let slot = *slots.entry((label, ip)).or_insert_with(|| {
            ip_groups.push((ip, Vec::new()));
            ip_groups.len() - 1
        });
        ip_groups[slot].1.push(entry);
    }

    groups
}
