use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{TrainingRun, TrainingSettings};
use crate::db::types::TrainingRunStatus;
use crate::repositories::training::TrainingSampleCounts;

#[derive(Debug, Deserialize)]
pub(crate) struct TrainingScopeQuery {
    #[serde(default)]
    #[serde(alias = "schoolId")]
    pub(crate) school_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrainingHistoryQuery {
    #[serde(default)]
    #[serde(alias = "schoolId")]
    pub(crate) school_id: Option<String>,
    #[serde(default = "default_history_limit")]
    pub(crate) limit: i64,
}

pub(crate) fn default_history_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TrainingSettingsUpdate {
    #[serde(alias = "aiWeight")]
    #[validate(range(min = 0.0, max = 1.0, message = "ai_weight must be within 0..=1"))]
    pub(crate) ai_weight: f64,
    #[serde(alias = "teacherWeight")]
    #[validate(range(min = 0.0, max = 1.0, message = "teacher_weight must be within 0..=1"))]
    pub(crate) teacher_weight: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct TrainingSettingsResponse {
    pub(crate) id: String,
    pub(crate) school_id: Option<String>,
    pub(crate) ai_weight: f64,
    pub(crate) teacher_weight: f64,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl TrainingSettingsResponse {
    pub(crate) fn from_db(settings: TrainingSettings) -> Self {
        Self {
            id: settings.id,
            school_id: settings.school_id,
            ai_weight: settings.ai_weight,
            teacher_weight: settings.teacher_weight,
            created_at: format_primitive(settings.created_at),
            updated_at: format_primitive(settings.updated_at),
        }
    }
}

/// Effective weights for a scope that has no stored settings row yet.
#[derive(Debug, Serialize)]
pub(crate) struct EffectiveTrainingSettingsResponse {
    pub(crate) school_id: Option<String>,
    pub(crate) ai_weight: f64,
    pub(crate) teacher_weight: f64,
    pub(crate) persisted: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct TrainingRunResponse {
    pub(crate) id: String,
    pub(crate) school_id: Option<String>,
    pub(crate) status: TrainingRunStatus,
    pub(crate) samples: i32,
    pub(crate) accuracy: Option<f64>,
    pub(crate) mse: Option<f64>,
    pub(crate) mae: Option<f64>,
    pub(crate) ai_weight: f64,
    pub(crate) teacher_weight: f64,
    pub(crate) error_message: Option<String>,
    pub(crate) created_at: String,
}

impl TrainingRunResponse {
    pub(crate) fn from_db(run: TrainingRun) -> Self {
        Self {
            id: run.id,
            school_id: run.school_id,
            status: run.status,
            samples: run.samples,
            accuracy: run.accuracy,
            mse: run.mse,
            mae: run.mae,
            ai_weight: run.ai_weight,
            teacher_weight: run.teacher_weight,
            error_message: run.error_message,
            created_at: format_primitive(run.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TrainingStatsResponse {
    pub(crate) total_samples: i64,
    pub(crate) samples_with_ai: i64,
    pub(crate) samples_with_teacher: i64,
    pub(crate) samples_used_for_training: i64,
    pub(crate) last_training_date: Option<String>,
    pub(crate) last_training_accuracy: Option<f64>,
    pub(crate) last_training_mse: Option<f64>,
    pub(crate) last_training_mae: Option<f64>,
}

impl TrainingStatsResponse {
    pub(crate) fn from_parts(counts: TrainingSampleCounts, last_run: Option<TrainingRun>) -> Self {
        Self {
            total_samples: counts.total,
            samples_with_ai: counts.with_ai,
            samples_with_teacher: counts.with_teacher,
            samples_used_for_training: counts.used,
            last_training_date: last_run.as_ref().map(|run| format_primitive(run.created_at)),
            last_training_accuracy: last_run.as_ref().and_then(|run| run.accuracy),
            last_training_mse: last_run.as_ref().and_then(|run| run.mse),
            last_training_mae: last_run.as_ref().and_then(|run| run.mae),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TrainingSyncResponse {
    pub(crate) exam_tasks_synced: i64,
    pub(crate) assignment_submissions_synced: i64,
}
