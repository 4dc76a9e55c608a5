pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::ai_assist::AiAssistService;
use crate::services::storage::StorageService;
use crate::services::training_provider::TrainingClient;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let storage = StorageService::from_settings(&settings).await?;
    if storage.is_none() {
        tracing::info!("S3 storage is not configured; submission file links are disabled");
    }
    let ai_assist = AiAssistService::from_settings(&settings)?;
    if ai_assist.is_none() {
        tracing::info!("AI grading is not configured; suggestions are disabled");
    }
    let training = TrainingClient::from_settings(&settings)?;
    if training.is_none() {
        tracing::info!("Training provider is not configured; training runs are disabled");
    }

    let state = AppState::new(settings, db_pool, storage, ai_assist, training);

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Edugrade Rust API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    Ok(())
}
