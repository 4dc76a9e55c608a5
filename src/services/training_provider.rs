use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::config::Settings;

/// One blended sample in the provider's wire format.
#[derive(Debug, Serialize)]
pub(crate) struct TrainingSamplePayload {
    pub(crate) question: String,
    pub(crate) answer: String,
    #[serde(rename = "targetScore")]
    pub(crate) target_score: f64,
    #[serde(rename = "targetFeedback")]
    pub(crate) target_feedback: String,
}

/// Provider verdict for one training batch. `success = false` carries the
/// provider's own error message instead of the metrics.
#[derive(Debug, Deserialize)]
pub(crate) struct TrainingReport {
    pub(crate) success: bool,
    #[serde(default)]
    pub(crate) accuracy: Option<f64>,
    #[serde(default)]
    pub(crate) mse: Option<f64>,
    #[serde(default)]
    pub(crate) mae: Option<f64>,
    #[serde(default)]
    pub(crate) samples: Option<i64>,
    #[serde(default)]
    pub(crate) error: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct TrainingClient {
    client: Client,
    base_url: String,
}

impl TrainingClient {
    /// Returns None when no training endpoint is configured.
    pub(crate) fn from_settings(settings: &Settings) -> Result<Option<Self>> {
        let base_url = match settings.training().ml_api_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => return Ok(None),
        };

        let timeout = Duration::from_secs(settings.training().request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Some(Self { client, base_url }))
    }

    /// Submits one training batch and returns the provider's report. Training
    /// runs to completion within the request, so no retrying here: a failed
    /// batch becomes an auditable failed run instead.
    pub(crate) async fn train(&self, samples: &[TrainingSamplePayload]) -> Result<TrainingReport> {
        let url = format!("{}/api/train", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "samples": samples }))
            .send()
            .await
            .context("Failed to call training API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json().await.unwrap_or(serde_json::Value::Null);
            let message = body
                .get("error")
                .and_then(|value| value.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {status}"));
            anyhow::bail!("Training API error: {message}");
        }

        response
            .json()
            .await
            .context("Failed to parse training API response")
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support;

    use super::*;

    #[test]
    fn sample_payload_uses_the_provider_field_names() {
        let payload = TrainingSamplePayload {
            question: "Explain recursion".to_string(),
            answer: "A function calling itself".to_string(),
            target_score: 4.2,
            target_feedback: "Mostly right".to_string(),
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["targetScore"], 4.2);
        assert_eq!(value["targetFeedback"], "Mostly right");
        assert!(value.get("target_score").is_none());
    }

    #[test]
    fn client_is_disabled_without_an_endpoint() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::remove_var("ML_API_URL");

        let settings = Settings::load().unwrap();
        assert!(TrainingClient::from_settings(&settings).unwrap().is_none());
    }
}
