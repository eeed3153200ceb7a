//! External collaborators: the log store and the classification service.

pub mod batch;
pub mod classifier;
pub mod graylog;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logs::RawLogEntry;

/// Hard bounds on how many entries a single fetch may request.
pub const MIN_FETCH_LIMIT: usize = 1;
pub const MAX_FETCH_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("log feed unavailable: {0}")]
    FeedUnavailable(String),
    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(String),
}

/// Classifier verdict for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<HashMap<String, f64>>,
}

/// Source of recent log entries, newest first.
#[async_trait::async_trait]
pub trait LogFeed: Send + Sync {
    async fn fetch_recent_logs(&self, limit: usize) -> Result<Vec<RawLogEntry>, SourceError>;

    /// Entries the last successful fetch discarded as unusable.
    fn last_fetch_dropped(&self) -> usize {
        0
    }
}

/// Assigns a classification label to a log message.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, message: &str) -> Result<Classification, SourceError>;
}

pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(MIN_FETCH_LIMIT, MAX_FETCH_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(150), 150);
        assert_eq!(clamp_limit(5000), 1000);
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
#[cfg(test)]
pub(crate) async fn spawn_mock_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
