use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::core::config::Settings;

const DOCUMENT_EXCERPT_LIMIT: usize = 8_000;

#[derive(Debug, Clone)]
pub(crate) struct Suggestion {
    pub(crate) score: f64,
    pub(crate) feedback: String,
}

#[derive(Debug, Deserialize)]
struct GradeResponseBody {
    score: f64,
    #[serde(default)]
    feedback: String,
}

#[derive(Debug, Clone)]
pub(crate) struct AiAssistService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl AiAssistService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Option<Self>> {
        let base_url = settings.ai_assist().base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Ok(None);
        }

        let timeout = Duration::from_secs(settings.ai_assist().request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let api_key = settings.ai_assist().api_key.clone();
        Ok(Some(Self {
            client,
            base_url,
            api_key: if api_key.is_empty() { None } else { Some(api_key) },
        }))
    }

    /// Requests a grading suggestion for one answer. The returned score is
    /// clamped into `0..=max_score` regardless of what the model produced.
    pub(crate) async fn suggest(
        &self,
        question: &str,
        answer: &str,
        max_score: f64,
    ) -> Result<Suggestion> {
        let payload = json!({
            "question": question,
            "answer": answer,
            "maxScore": max_score,
        });

        let url = format!("{}/api/grade", self.base_url);
        let mut last_error = None;
        let mut body = serde_json::Value::Null;

        for attempt in 0..=3 {
            let mut request = self.client.post(&url).json(&payload);
            if let Some(api_key) = &self.api_key {
                request = request.bearer_auth(api_key);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    body = resp.json().await.unwrap_or(serde_json::Value::Null);
                    if status.is_success() {
                        last_error = None;
                        break;
                    }
                    last_error = Some(anyhow::anyhow!("Grading API error: {body}"));
                }
                Err(err) => {
                    last_error = Some(anyhow::anyhow!(err).context("Failed to call grading API"));
                }
            }

            if attempt < 3 {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt as u32))).await;
            }
        }

        if let Some(err) = last_error {
            return Err(err);
        }

        let parsed: GradeResponseBody =
            serde_json::from_value(body).context("Failed to parse grading API response")?;

        Ok(Suggestion {
            score: clamp_score(parsed.score, max_score),
            feedback: parsed.feedback,
        })
    }
}

/// Suggested scores outside the question's range are folded back into it; a
/// non-finite score collapses to zero.
pub(crate) fn clamp_score(score: f64, max_score: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(0.0, max_score.max(0.0))
}

/// Prompt context for an assignment: the title plus an optional description.
pub(crate) fn assignment_question(title: &str, description: Option<&str>) -> String {
    match description {
        Some(description) if !description.trim().is_empty() => {
            format!("Assignment: {title}\nDescription: {description}")
        }
        _ => format!("Assignment: {title}"),
    }
}

/// Answer side of an assignment prompt. When the stored document could be
/// decoded as text, an excerpt rides along; otherwise only the file name does.
pub(crate) fn assignment_answer(file_name: &str, document_text: Option<&str>) -> String {
    match document_text {
        Some(text) if !text.trim().is_empty() => {
            let excerpt = truncate_excerpt(text, DOCUMENT_EXCERPT_LIMIT);
            format!("Submitted file: {file_name}\n\n{excerpt}")
        }
        _ => format!("Submitted file: {file_name}"),
    }
}

/// Whether the uploaded file is worth fetching and inlining into the prompt.
/// Binary formats only waste a storage round trip.
pub(crate) fn is_text_document(file_name: &str) -> bool {
    let extension = file_name.rsplit('.').next().unwrap_or_default().to_lowercase();
    matches!(
        extension.as_str(),
        "txt" | "md" | "markdown" | "csv" | "json" | "tex" | "html" | "htm"
    )
}

fn truncate_excerpt(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
