use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!(
        "http_requests_total",
        "Total HTTP requests handled, labeled by status"
    );
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request latency, labeled by status"
    );
    metrics::describe_counter!(
        "assessment_submissions_total",
        "Assessment submissions accepted, labeled by result"
    );
    metrics::describe_counter!(
        "ai_suggestions_total",
        "AI-assist suggestion calls, labeled by source and outcome"
    );
    metrics::describe_counter!(
        "grading_completions_total",
        "Grading tasks and assignment submissions finalized by a reviewer, labeled by kind"
    );
    metrics::describe_counter!("training_runs_total", "Training runs, labeled by status");
}
