//! Alert rule table and message templating.
//!
//! Templates may reference `{count}`, `{timeWindow}` and `{ip}`.

use serde::{Deserialize, Serialize};

use super::{AlertType, DetectError, Severity};

/// One row of the rule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    pub rule_type: AlertType,
    /// Classification label this rule counts.
    pub watched_classification: String,
    /// Minimum number of events inside the window.
    pub threshold: usize,
    pub window_seconds: u64,
    pub severity: Severity,
    pub title_template: String,
    pub message_template: String,
}

impl AlertRule {
    pub fn render_title(&self, count: usize, ip: &str) -> String {
        render(&self.title_template, count, self.window_seconds, ip)
    }

    pub fn render_message(&self, count: usize, ip: &str) -> String {
        render(&self.message_template, count, self.window_seconds, ip)
    }
}

/// Substitute every placeholder occurrence in `template`.
pub fn render(template: &str, count: usize, window_seconds: u64, ip: &str) -> String {
    template
        .replace("{count}", &count.to_string())
        .replace("{timeWindow}", &window_seconds.to_string())
        .replace("{ip}", ip)
}

/// The out-of-box rule table.
pub fn defaults() -> Vec<AlertRule> {
    vec![
        AlertRule {
            rule_type: AlertType::LoginFailedBurst,
            watched_classification: "login_failed".to_string(),
            threshold: 5,
            window_seconds: 60,
            severity: Severity::High,
            title_template: "Multiple Login Failures Detected".to_string(),
            message_template:
                "{count} failed login attempts detected in {timeWindow} seconds from {ip}"
                    .to_string(),
        },
        AlertRule {
            rule_type: AlertType::PrivilegeEscalationDetected,
            watched_classification: "privilege_escalation".to_string(),
            threshold: 1,
            window_seconds: 300,
            severity: Severity::Critical,
            title_template: "Privilege Escalation Detected".to_string(),
            message_template: "Privilege escalation attempt detected from {ip}".to_string(),
        },
        AlertRule {
            rule_type: AlertType::UserCreationBurst,
            watched_classification: "user_creation".to_string(),
            threshold: 3,
            window_seconds: 300,
            severity: Severity::Medium,
            title_template: "Multiple User Creations".to_string(),
            message_template:
                "{count} user creation events detected in {timeWindow} seconds from {ip}"
                    .to_string(),
        },
        AlertRule {
            rule_type: AlertType::RegistryModificationBurst,
            watched_classification: "registry_modification".to_string(),
            threshold: 10,
            window_seconds: 120,
            severity: Severity::Medium,
            title_template: "High Registry Activity".to_string(),
            message_template:
                "{count} registry modifications detected in {timeWindow} seconds from {ip}"
                    .to_string(),
        },
        AlertRule {
            rule_type: AlertType::SystemErrorBurst,
            watched_classification: "system_error".to_string(),
            threshold: 15,
            window_seconds: 300,
            severity: Severity::Low,
            title_template: "System Error Spike".to_string(),
            message_template: "{count} system errors detected in {timeWindow} seconds".to_string(),
        },
    ]
}

/// Longest accepted detection window (one year).
pub const MAX_WINDOW_SECONDS: u64 = 366 * 24 * 60 * 60;

/// Reject rule tables the engine cannot evaluate meaningfully.
///
/// Duplicate rules on one classification are allowed.
pub fn validate(rules: &[AlertRule]) -> Result<(), DetectError> {
    if rules.is_empty() {
        return Err(DetectError::NoRules);
    }
    for (index, rule) in rules.iter().enumerate() {
        let reason = if rule.threshold == 0 {
            Some("threshold must be at least 1")
        } else if rule.window_seconds == 0 {
            Some("window_seconds must be at least 1")
        } else if rule.window_seconds > MAX_WINDOW_SECONDS {
            Some("window_seconds exceeds one year")
        } else if rule.watched_classification.trim().is_empty() {
            Some("watched_classification is empty")
        } else if rule.title_template.trim().is_empty() {
            Some("title_template is empty")
        } else if rule.message_template.trim().is_empty() {
            Some("message_template is empty")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(DetectError::InvalidRule {
                index,
                rule_type: rule.rule_type,
                reason: reason.to_string(),
            });
        }
    }
    Ok(())
}
