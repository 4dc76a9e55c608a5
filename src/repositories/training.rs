use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{TrainingRun, TrainingSample, TrainingSettings};
use crate::db::types::{TrainingRunStatus, TrainingSource};

pub(crate) const SAMPLE_COLUMNS: &str = "\
    id, question, answer, ai_score, ai_feedback, teacher_score, teacher_feedback, \
    max_score, source_type, source_id, school_id, used_for_training, created_at, updated_at";

const SETTINGS_COLUMNS: &str =
    "id, school_id, ai_weight, teacher_weight, created_at, updated_at";

const RUN_COLUMNS: &str = "\
    id, school_id, status, samples, accuracy, mse, mae, ai_weight, teacher_weight, \
    error_message, created_at";

pub(crate) struct UpsertTrainingSample<'a> {
    pub(crate) id: &'a str,
    pub(crate) question: &'a str,
    pub(crate) answer: &'a str,
    pub(crate) ai_score: Option<f64>,
    pub(crate) ai_feedback: Option<&'a str>,
    pub(crate) teacher_score: Option<f64>,
    pub(crate) teacher_feedback: Option<&'a str>,
    pub(crate) max_score: f64,
    pub(crate) source_type: TrainingSource,
    pub(crate) source_id: &'a str,
    pub(crate) school_id: Option<&'a str>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) struct CreateTrainingRun<'a> {
    pub(crate) id: &'a str,
    pub(crate) school_id: Option<&'a str>,
    pub(crate) status: TrainingRunStatus,
    pub(crate) samples: i32,
    pub(crate) accuracy: Option<f64>,
    pub(crate) mse: Option<f64>,
    pub(crate) mae: Option<f64>,
    pub(crate) ai_weight: f64,
    pub(crate) teacher_weight: f64,
    pub(crate) error_message: Option<&'a str>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TrainingSampleCounts {
    pub(crate) total: i64,
    pub(crate) with_ai: i64,
    pub(crate) with_teacher: i64,
    pub(crate) used: i64,
}

/// Grading task that has no training sample yet, with the question context a
/// sample records.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UnsampledGradingTask {
    pub(crate) task_id: String,
    pub(crate) question_text: String,
    pub(crate) question_points: f64,
    pub(crate) answer: String,
    pub(crate) ai_score: Option<f64>,
    pub(crate) ai_feedback: Option<String>,
    pub(crate) teacher_score: Option<f64>,
    pub(crate) teacher_feedback: Option<String>,
    pub(crate) school_id: Option<String>,
}

/// Graded assignment submission that has no training sample yet.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UnsampledAssignmentSubmission {
    pub(crate) submission_id: String,
    pub(crate) assignment_title: String,
    pub(crate) assignment_description: Option<String>,
    pub(crate) max_score: f64,
    pub(crate) file_name: String,
    pub(crate) ai_score: Option<f64>,
    pub(crate) ai_feedback: Option<String>,
    pub(crate) score: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) school_id: Option<String>,
}

/// Inserts a sample or folds new scores into the existing one for the same
/// source. A missing field never erases a previously stored value.
pub(crate) async fn upsert_sample(
    executor: impl sqlx::PgExecutor<'_>,
    params: UpsertTrainingSample<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO training_samples (id, question, answer, ai_score, ai_feedback, \
         teacher_score, teacher_feedback, max_score, source_type, source_id, school_id, \
         created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (source_type, source_id) DO UPDATE SET \
             question = EXCLUDED.question, \
             answer = EXCLUDED.answer, \
             ai_score = COALESCE(EXCLUDED.ai_score, training_samples.ai_score), \
             ai_feedback = COALESCE(EXCLUDED.ai_feedback, training_samples.ai_feedback), \
             teacher_score = COALESCE(EXCLUDED.teacher_score, training_samples.teacher_score), \
             teacher_feedback = COALESCE(EXCLUDED.teacher_feedback, training_samples.teacher_feedback), \
             max_score = EXCLUDED.max_score, \
             school_id = COALESCE(EXCLUDED.school_id, training_samples.school_id), \
             updated_at = EXCLUDED.updated_at",
    )
    .bind(params.id)
    .bind(params.question)
    .bind(params.answer)
    .bind(params.ai_score)
    .bind(params.ai_feedback)
    .bind(params.teacher_score)
    .bind(params.teacher_feedback)
    .bind(params.max_score)
    .bind(params.source_type)
    .bind(params.source_id)
    .bind(params.school_id)
    .bind(params.created_at)
    .bind(params.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Most recent samples carrying a full AI pair or a full reviewer pair, newest
/// first. Already-used samples stay eligible: a re-run retrains on the whole
/// corpus with the weights in force at that moment.
pub(crate) async fn eligible_samples(
    pool: &PgPool,
    school_id: Option<&str>,
    limit: i64,
) -> Result<Vec<TrainingSample>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {SAMPLE_COLUMNS} FROM training_samples \
         WHERE ((ai_score IS NOT NULL AND ai_feedback IS NOT NULL) \
             OR (teacher_score IS NOT NULL AND teacher_feedback IS NOT NULL)) \
         AND ($1::TEXT IS NULL OR school_id = $1) \
         ORDER BY created_at DESC LIMIT $2"
    ))
    .bind(school_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub(crate) async fn mark_samples_used(
    executor: impl sqlx::PgExecutor<'_>,
    ids: &[String],
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    if ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "UPDATE training_samples SET used_for_training = TRUE, updated_at = $1 \
         WHERE id = ANY($2)",
    )
    .bind(now)
    .bind(ids)
    .execute(executor)
    .await?;
    Ok(())
}

/// A sample counts toward `total` once it carries a full AI pair or a full
/// reviewer pair; partial rows are still being assembled.
pub(crate) async fn sample_counts(
    pool: &PgPool,
    school_id: Option<&str>,
) -> Result<TrainingSampleCounts, sqlx::Error> {
    sqlx::query_as(
        "SELECT \
         COUNT(*) FILTER (WHERE (ai_score IS NOT NULL AND ai_feedback IS NOT NULL) \
             OR (teacher_score IS NOT NULL AND teacher_feedback IS NOT NULL)) AS total, \
         COUNT(*) FILTER (WHERE ai_score IS NOT NULL AND ai_feedback IS NOT NULL) AS with_ai, \
         COUNT(*) FILTER (WHERE teacher_score IS NOT NULL AND teacher_feedback IS NOT NULL) \
             AS with_teacher, \
         COUNT(*) FILTER (WHERE used_for_training) AS used \
         FROM training_samples WHERE ($1::TEXT IS NULL OR school_id = $1)",
    )
    .bind(school_id)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find_settings(
    pool: &PgPool,
    school_id: Option<&str>,
) -> Result<Option<TrainingSettings>, sqlx::Error> {
    match school_id {
        Some(school_id) => {
            sqlx::query_as(&format!(
                "SELECT {SETTINGS_COLUMNS} FROM training_settings WHERE school_id = $1"
            ))
            .bind(school_id)
            .fetch_optional(pool)
            .await
        }
        None => {
            sqlx::query_as(&format!(
                "SELECT {SETTINGS_COLUMNS} FROM training_settings WHERE school_id IS NULL"
            ))
            .fetch_optional(pool)
            .await
        }
    }
}

pub(crate) async fn update_settings(
    executor: impl sqlx::PgExecutor<'_>,
    school_id: Option<&str>,
    ai_weight: f64,
    teacher_weight: f64,
    now: PrimitiveDateTime,
) -> Result<Option<TrainingSettings>, sqlx::Error> {
    sqlx::query_as(&format!(
        "UPDATE training_settings SET ai_weight = $1, teacher_weight = $2, updated_at = $3 \
         WHERE school_id IS NOT DISTINCT FROM $4 \
         RETURNING {SETTINGS_COLUMNS}"
    ))
    .bind(ai_weight)
    .bind(teacher_weight)
    .bind(now)
    .bind(school_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn insert_settings(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    school_id: Option<&str>,
    ai_weight: f64,
    teacher_weight: f64,
    now: PrimitiveDateTime,
) -> Result<TrainingSettings, sqlx::Error> {
    sqlx::query_as(&format!(
        "INSERT INTO training_settings (id, school_id, ai_weight, teacher_weight, created_at, \
         updated_at) \
         VALUES ($1, $2, $3, $4, $5, $5) \
         RETURNING {SETTINGS_COLUMNS}"
    ))
    .bind(id)
    .bind(school_id)
    .bind(ai_weight)
    .bind(teacher_weight)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn create_run(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateTrainingRun<'_>,
) -> Result<TrainingRun, sqlx::Error> {
    sqlx::query_as(&format!(
        "INSERT INTO training_runs (id, school_id, status, samples, accuracy, mse, mae, \
         ai_weight, teacher_weight, error_message, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.school_id)
    .bind(params.status)
    .bind(params.samples)
    .bind(params.accuracy)
    .bind(params.mse)
    .bind(params.mae)
    .bind(params.ai_weight)
    .bind(params.teacher_weight)
    .bind(params.error_message)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_runs(
    pool: &PgPool,
    school_id: Option<&str>,
    limit: i64,
) -> Result<Vec<TrainingRun>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {RUN_COLUMNS} FROM training_runs \
         WHERE ($1::TEXT IS NULL OR school_id = $1) \
         ORDER BY created_at DESC LIMIT $2"
    ))
    .bind(school_id)
    .bind(limit.clamp(1, 100))
    .fetch_all(pool)
    .await
}

pub(crate) async fn last_completed_run(
    pool: &PgPool,
    school_id: Option<&str>,
) -> Result<Option<TrainingRun>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {RUN_COLUMNS} FROM training_runs \
         WHERE ($1::TEXT IS NULL OR school_id = $1) AND status = $2 \
         ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(school_id)
    .bind(TrainingRunStatus::Completed)
    .fetch_optional(pool)
    .await
}

/// Grading tasks holding an AI pair that never produced a training sample.
/// Used by the backfill sync for data that predates sample capture; pending
/// tasks qualify because an AI pair alone is already trainable.
pub(crate) async fn unsampled_grading_tasks(
    pool: &PgPool,
    school_id: Option<&str>,
) -> Result<Vec<UnsampledGradingTask>, sqlx::Error> {
    sqlx::query_as(
        "SELECT gt.id AS task_id, q.text AS question_text, q.points AS question_points, \
         gt.answer, gt.ai_score, gt.ai_feedback, gt.teacher_score, gt.teacher_feedback, \
         c.school_id \
         FROM grading_tasks gt \
         JOIN questions q ON q.id = gt.question_id \
         JOIN submissions s ON s.id = gt.submission_id \
         JOIN assessments a ON a.id = s.assessment_id \
         JOIN courses c ON c.id = a.course_id \
         WHERE gt.ai_score IS NOT NULL AND gt.ai_feedback IS NOT NULL \
         AND ($1::TEXT IS NULL OR c.school_id = $1) \
         AND NOT EXISTS (\
             SELECT 1 FROM training_samples ts \
             WHERE ts.source_type = $2 AND ts.source_id = gt.id\
         )",
    )
    .bind(school_id)
    .bind(TrainingSource::Exam)
    .fetch_all(pool)
    .await
}

pub(crate) async fn unsampled_assignment_submissions(
    pool: &PgPool,
    school_id: Option<&str>,
) -> Result<Vec<UnsampledAssignmentSubmission>, sqlx::Error> {
    sqlx::query_as(
        "SELECT asub.id AS submission_id, ag.title AS assignment_title, \
         ag.description AS assignment_description, ag.max_score, asub.file_name, \
         asub.ai_score, asub.ai_feedback, asub.score, asub.feedback, c.school_id \
         FROM assignment_submissions asub \
         JOIN assignments ag ON ag.id = asub.assignment_id \
         JOIN courses c ON c.id = ag.course_id \
         WHERE asub.ai_score IS NOT NULL AND asub.ai_feedback IS NOT NULL \
         AND ($1::TEXT IS NULL OR c.school_id = $1) \
         AND NOT EXISTS (\
             SELECT 1 FROM training_samples ts \
             WHERE ts.source_type = $2 AND ts.source_id = asub.id\
         )",
    )
    .bind(school_id)
    .bind(TrainingSource::Assignment)
    .fetch_all(pool)
    .await
}
