//! Best-effort notification side-channel for severe alerts.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::detect::{Alert, Severity};

/// Receives newly merged high/critical alerts.
///
/// Implementations must not block; delivery failures are reported through
/// the returned error and never affect alert state.
pub trait Notifier: Send + Sync {
    fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Emits notifications into the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, alert: &Alert) -> Result<()> {
        warn!(
            id = %alert.id,
            severity = %alert.severity,
            title = %alert.title,
            "{}",
            alert.message
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
struct WebhookPayload {
    id: String,
    title: String,
    message: String,
    severity: Severity,
    fired_at: String,
}

/// POSTs a JSON payload per alert to a configured URL.
///
/// Delivery runs on a spawned task. Outside a tokio runtime the
/// notification is skipped.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, alert: &Alert) -> Result<()> {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(id = %alert.id, "no runtime available, skipping webhook notification");
            return Ok(());
        };

        let payload = WebhookPayload {
            id: alert.id.clone(),
            title: alert.title.clone(),
            message: alert.message.clone(),
            severity: alert.severity,
            fired_at: alert.fired_at.to_rfc3339(),
        };
        let client = self.client.clone();
        let url = self.url.clone();

        handle.spawn(async move {
            let result = client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            match result {
                Ok(_) => debug!(id = %payload.id, "webhook notification delivered"),
                Err(e) => warn!(id = %payload.id, error = %e, "webhook notification failed"),
            }
        });
        Ok(())
    }
}
