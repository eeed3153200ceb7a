//! HTTP client for the log classification service.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{Classification, Classifier, SourceError};

/// Prediction payload. The service answers with Spanish field names.
#[derive(Debug, Deserialize)]
struct PredictionResponse {
    #[serde(alias = "label")]
    clase: String,
    #[serde(alias = "confidence")]
    confianza: f64,
    #[serde(default, alias = "probabilidades")]
    probabilities: Option<HashMap<String, f64>>,
}

pub struct HttpClassifier {
    client: Client,
    predict_url: String,
}

impl HttpClassifier {
    pub fn new(predict_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::ClassifierUnavailable(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            predict_url: predict_url.into(),
        })
    }
}

#[async_trait::async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, message: &str) -> Result<Classification, SourceError> {
        let response = self
            .client
            .post(&self.predict_url)
            .json(&json!({ "message": message }))
            .send()
            .await
            .map_err(|e| SourceError::ClassifierUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::ClassifierUnavailable(format!(
                "prediction returned {}",
                status
            )));
        }

        let prediction: PredictionResponse = response
            .json()
            .await
            .map_err(|e| SourceError::ClassifierUnavailable(format!("malformed prediction: {}", e)))?;

        Ok(Classification {
            label: prediction.clase,
            confidence: prediction.confianza,
            probabilities: prediction.probabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::spawn_mock_server;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::Value;

    #[tokio::test]
    async fn test_classify_parses_prediction() {
        let router = Router::new().route(
            "/api/prediccion",
            post(|Json(body): Json<Value>| async move {
                let label = if body["message"].as_str().unwrap_or("").contains("Failed password") {
                    "login_failed"
                } else {
                    "normal"
                };
                Json(json!({
                    "clase": label,
                    "confianza": 0.87,
                    "log": body["message"],
                    "probabilities": { "login_failed": 0.87, "normal": 0.13 }
                }))
            }),
        );
        let base = spawn_mock_server(router).await;
        let classifier =
            HttpClassifier::new(format!("{}/api/prediccion", base), Duration::from_secs(5)).unwrap();

        let verdict = classifier
            .classify("sshd: Failed password for root from 10.0.0.5")
            .await
            .unwrap();
        assert_eq!(verdict.label, "login_failed");
        assert_eq!(verdict.confidence, 0.87);
        assert_eq!(verdict.probabilities.unwrap()["normal"], 0.13);

        let verdict = classifier.classify("cron job finished").await.unwrap();
        assert_eq!(verdict.label, "normal");
    }

    #[tokio::test]
    async fn test_classify_error_status() {
        let router = Router::new().route(
            "/api/prediccion",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
        );
        let base = spawn_mock_server(router).await;
        let classifier =
            HttpClassifier::new(format!("{}/api/prediccion", base), Duration::from_secs(5)).unwrap();

        assert!(matches!(
            classifier.classify("anything").await,
            Err(SourceError::ClassifierUnavailable(_))
        ));
    }
}
