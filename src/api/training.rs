use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{self, CurrentAdmin};
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::training::{
    EffectiveTrainingSettingsResponse, TrainingHistoryQuery, TrainingRunResponse,
    TrainingScopeQuery, TrainingSettingsResponse, TrainingSettingsUpdate, TrainingStatsResponse,
    TrainingSyncResponse,
};
use crate::services::training_pipeline::{self, TrainingError};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/settings", get(get_settings).put(put_settings))
        .route("/runs", get(list_runs).post(trigger_training))
        .route("/stats", get(stats))
        .route("/sync", post(sync_samples))
}

async fn get_settings(
    Query(params): Query<TrainingScopeQuery>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let scope = guards::training_scope(&admin, params.school_id)?;

    let stored = repositories::training::find_settings(state.db(), scope.as_deref())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch training settings"))?;
    if let Some(settings) = stored {
        return Ok(Json(TrainingSettingsResponse::from_db(settings)).into_response());
    }

    let effective = training_pipeline::resolve_settings(state.db(), scope.as_deref())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to resolve training settings"))?;

    Ok(Json(EffectiveTrainingSettingsResponse {
        school_id: scope,
        ai_weight: effective.ai_weight,
        teacher_weight: effective.teacher_weight,
        persisted: effective.persisted,
    })
    .into_response())
}

async fn put_settings(
    Query(params): Query<TrainingScopeQuery>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<TrainingSettingsUpdate>,
) -> Result<Json<TrainingSettingsResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let scope = guards::training_scope(&admin, params.school_id)?;

    let settings = training_pipeline::update_settings(
        &state,
        scope.as_deref(),
        payload.ai_weight,
        payload.teacher_weight,
    )
    .await
    .map_err(|err| match err {
        TrainingError::InvalidWeights => ApiError::BadRequest(err.to_string()),
        other => ApiError::internal(other, "Failed to update training settings"),
    })?;

    Ok(Json(TrainingSettingsResponse::from_db(settings)))
}

async fn trigger_training(
    Query(params): Query<TrainingScopeQuery>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<TrainingRunResponse>, ApiError> {
    let scope = guards::training_scope(&admin, params.school_id)?;

    let run = training_pipeline::train(&state, scope.as_deref())
        .await
        .map_err(|err| match err {
            TrainingError::InvalidWeights | TrainingError::InsufficientData => {
                ApiError::BadRequest(err.to_string())
            }
            TrainingError::ProviderUnavailable => ApiError::ServiceUnavailable(err.to_string()),
            TrainingError::ProviderFailed(message) => ApiError::ServiceUnavailable(message),
            TrainingError::Internal(e) => ApiError::internal(e, "Failed to run training"),
        })?;

    Ok(Json(TrainingRunResponse::from_db(run)))
}

async fn list_runs(
    Query(params): Query<TrainingHistoryQuery>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<TrainingRunResponse>>, ApiError> {
    let scope = guards::training_scope(&admin, params.school_id)?;

    let runs = repositories::training::list_runs(state.db(), scope.as_deref(), params.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list training runs"))?;

    Ok(Json(runs.into_iter().map(TrainingRunResponse::from_db).collect()))
}

async fn stats(
    Query(params): Query<TrainingScopeQuery>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<TrainingStatsResponse>, ApiError> {
    let scope = guards::training_scope(&admin, params.school_id)?;

    let counts = repositories::training::sample_counts(state.db(), scope.as_deref())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count training samples"))?;
    let last_run = repositories::training::last_completed_run(state.db(), scope.as_deref())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch last training run"))?;

    Ok(Json(TrainingStatsResponse::from_parts(counts, last_run)))
}

async fn sync_samples(
    Query(params): Query<TrainingScopeQuery>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<TrainingSyncResponse>, ApiError> {
    let scope = guards::training_scope(&admin, params.school_id)?;

    let outcome = training_pipeline::sync_samples(&state, scope.as_deref())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to sync training samples"))?;

    tracing::info!(
        admin_id = %admin.id,
        exam_tasks = outcome.exam_tasks,
        assignment_submissions = outcome.assignment_submissions,
        action = "training_sync",
        "Training samples synced"
    );

    Ok(Json(TrainingSyncResponse {
        exam_tasks_synced: outcome.exam_tasks,
        assignment_submissions_synced: outcome.assignment_submissions,
    }))
}
