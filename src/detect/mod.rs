//! Rule-based burst detection over classified log batches.

pub mod clock;
pub mod engine;
pub mod rules;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::engine::DetectionEngine;
pub use self::rules::AlertRule;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DetectError {
    #[error("rule table is empty")]
    NoRules,
    #[error("rule #{index} ({rule_type}): {reason}")]
    InvalidRule {
        index: usize,
        rule_type: AlertType,
        reason: String,
    },
}

/// Severity levels for fired alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// High and critical alerts are pushed through the notification channel.
    pub fn is_notifiable(self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Kind of burst a rule detects. Alerts carry the type of the rule that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    LoginFailedBurst,
    PrivilegeEscalationDetected,
    UserCreationBurst,
    RegistryModificationBurst,
    SystemErrorBurst,
    SuspiciousActivity,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::LoginFailedBurst => "login_failed_burst",
            AlertType::PrivilegeEscalationDetected => "privilege_escalation_detected",
            AlertType::UserCreationBurst => "user_creation_burst",
            AlertType::RegistryModificationBurst => "registry_modification_burst",
            AlertType::SystemErrorBurst => "system_error_burst",
            AlertType::SuspiciousActivity => "suspicious_activity",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operator-facing alert produced by the detection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// `{type}-{ip}-{count}-{bucket}`, see [`DetectionEngine`].
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub fired_at: DateTime<Utc>,
    pub event_count: usize,
    pub window_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    /// Messages of the entries that satisfied the rule, in batch order.
    pub triggering_messages: Vec<String>,
    #[serde(default)]
    pub is_read: bool,
}
