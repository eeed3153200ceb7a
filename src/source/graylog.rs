//! Log feed backed by the Graylog Elasticsearch index.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{clamp_limit, LogFeed, SourceError};
use crate::logs::{parse_timestamp, RawLogEntry};

/// Source IP reported when the log store has none.
pub const UNKNOWN_SOURCE: &str = "Unknown";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: HitSource,
}

#[derive(Debug, Deserialize)]
struct HitSource {
    message: String,
    timestamp: String,
    #[serde(default)]
    gl2_remote_ip: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

impl HitSource {
    fn source_ip(&self) -> String {
        [&self.gl2_remote_ip, &self.source]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string())
    }
}

/// Fetches the most recent messages with a `match_all` search sorted by
/// timestamp, newest first.
pub struct GraylogFeed {
    client: Client,
    search_url: String,
    dropped: AtomicUsize,
}

impl GraylogFeed {
    pub fn new(search_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::FeedUnavailable(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            search_url: search_url.into(),
            dropped: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl LogFeed for GraylogFeed {
    async fn fetch_recent_logs(&self, limit: usize) -> Result<Vec<RawLogEntry>, SourceError> {
        let size = clamp_limit(limit);
        let body = json!({
            "query": { "match_all": {} },
            "sort": [ { "timestamp": { "order": "desc" } } ],
            "size": size,
        });

        let response = self
            .client
            .post(&self.search_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SourceError::FeedUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::FeedUnavailable(format!(
                "search returned {}",
                status
            )));
        }

        let data: SearchResponse = response
            .json()
            .await
            .map_err(|e| SourceError::FeedUnavailable(format!("malformed search response: {}", e)))?;

        let mut entries = Vec::with_capacity(data.hits.hits.len());
        let mut dropped = 0;
        for hit in data.hits.hits {
            let source_ip = hit.source.source_ip();
            let Some(timestamp) = parse_timestamp(&hit.source.timestamp) else {
                warn!(timestamp = %hit.source.timestamp, "dropping log entry with unparseable timestamp");
                dropped += 1;
                continue;
            };
            entries.push(RawLogEntry {
                message: hit.source.message,
                timestamp,
                source_ip,
            });
        }

        self.dropped.store(dropped, Ordering::Relaxed);
        debug!(requested = size, received = entries.len(), dropped, "fetched recent logs");
        Ok(entries)
    }

    fn last_fetch_dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}
