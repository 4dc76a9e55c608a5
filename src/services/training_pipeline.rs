//! Adaptive training loop: gathers graded samples, blends AI and reviewer
//! scores into targets and drives the external trainer, keeping an audit
//! trail of every attempt.

use anyhow::Context;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{TrainingRun, TrainingSample, TrainingSettings};
use crate::db::types::{TrainingRunStatus, TrainingSource};
use crate::repositories;
use crate::repositories::assignments::AssignmentSubmissionDetail;
use crate::repositories::grading_tasks::GradingTaskDetail;
use crate::repositories::training::{CreateTrainingRun, UpsertTrainingSample};
use crate::services::ai_assist;
use crate::services::training_provider::TrainingSamplePayload;

pub(crate) const MIN_TRAINING_SAMPLES: usize = 5;
pub(crate) const TRAINING_BATCH_LIMIT: i64 = 1000;
pub(crate) const DEFAULT_AI_WEIGHT: f64 = 0.3;
pub(crate) const DEFAULT_TEACHER_WEIGHT: f64 = 0.7;
const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, Error)]
pub(crate) enum TrainingError {
    #[error("ai_weight and teacher_weight must each be between 0 and 1 and sum to 1")]
    InvalidWeights,
    #[error("insufficient data: at least {MIN_TRAINING_SAMPLES} eligible samples are required")]
    InsufficientData,
    #[error("training provider is not configured")]
    ProviderUnavailable,
    #[error("{0}")]
    ProviderFailed(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Weights in force for a scope. `persisted` distinguishes a stored row from
/// the global or built-in fallback.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EffectiveSettings {
    pub(crate) ai_weight: f64,
    pub(crate) teacher_weight: f64,
    pub(crate) persisted: bool,
}

/// How one sample's scores turn into a training target. Modeled as a tagged
/// decision rather than nested conditionals so each arm tests in isolation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BlendDecision {
    OnlyAi(f64),
    OnlyHuman(f64),
    Blended { ai: f64, human: f64 },
    Excluded,
}

/// Weighted blending applies only when both sides scored and disagree. Equal
/// scores collapse to the shared value and a lone score is used as-is.
pub(crate) fn blend_decision(ai_score: Option<f64>, human_score: Option<f64>) -> BlendDecision {
    match (ai_score, human_score) {
        (Some(ai), Some(human)) if ai != human => BlendDecision::Blended { ai, human },
        (_, Some(human)) => BlendDecision::OnlyHuman(human),
        (Some(ai), None) => BlendDecision::OnlyAi(ai),
        (None, None) => BlendDecision::Excluded,
    }
}

impl BlendDecision {
    pub(crate) fn target(self, ai_weight: f64, teacher_weight: f64) -> Option<f64> {
        match self {
            BlendDecision::OnlyAi(score) => Some(score),
            BlendDecision::OnlyHuman(score) => Some(score),
            BlendDecision::Blended { ai, human } => Some(ai_weight * ai + teacher_weight * human),
            BlendDecision::Excluded => None,
        }
    }
}

pub(crate) fn weights_are_valid(ai_weight: f64, teacher_weight: f64) -> bool {
    (0.0..=1.0).contains(&ai_weight)
        && (0.0..=1.0).contains(&teacher_weight)
        && (ai_weight + teacher_weight - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
}

/// Weights for a scope: the scope's own row, else the global row, else the
/// built-in defaults.
pub(crate) async fn resolve_settings(
    pool: &PgPool,
    school_id: Option<&str>,
) -> anyhow::Result<EffectiveSettings> {
    if let Some(row) = repositories::training::find_settings(pool, school_id)
        .await
        .context("load training settings")?
    {
        return Ok(EffectiveSettings {
            ai_weight: row.ai_weight,
            teacher_weight: row.teacher_weight,
            persisted: true,
        });
    }
    if school_id.is_some() {
        if let Some(row) = repositories::training::find_settings(pool, None)
            .await
            .context("load global training settings")?
        {
            return Ok(EffectiveSettings {
                ai_weight: row.ai_weight,
                teacher_weight: row.teacher_weight,
                persisted: false,
            });
        }
    }
    Ok(EffectiveSettings {
        ai_weight: DEFAULT_AI_WEIGHT,
        teacher_weight: DEFAULT_TEACHER_WEIGHT,
        persisted: false,
    })
}

/// Stores the scope's weights, creating the row on first write.
pub(crate) async fn update_settings(
    state: &AppState,
    school_id: Option<&str>,
    ai_weight: f64,
    teacher_weight: f64,
) -> Result<TrainingSettings, TrainingError> {
    if !weights_are_valid(ai_weight, teacher_weight) {
        return Err(TrainingError::InvalidWeights);
    }
    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .context("begin training settings transaction")?;
    let updated =
        repositories::training::update_settings(&mut *tx, school_id, ai_weight, teacher_weight, now)
            .await
            .context("update training settings")?;
    let settings = match updated {
        Some(settings) => settings,
        None => {
            let id = Uuid::new_v4().to_string();
            repositories::training::insert_settings(
                &mut *tx,
                &id,
                school_id,
                ai_weight,
                teacher_weight,
                now,
            )
            .await
            .context("insert training settings")?
        }
    };
    tx.commit()
        .await
        .context("commit training settings transaction")?;
    tracing::info!(
        school_id = ?school_id,
        ai_weight,
        teacher_weight,
        "Training weights updated"
    );
    Ok(settings)
}

/// Runs one training attempt for the scope. Every outcome leaves a
/// TrainingRun behind: the success path records the provider's metrics and
/// marks the batch used in one transaction, while any failure records a
/// failed run with the message before the error is surfaced.
pub(crate) async fn train(
    state: &AppState,
    school_id: Option<&str>,
) -> Result<TrainingRun, TrainingError> {
    let settings = resolve_settings(state.db(), school_id).await?;
    match run_batch(state, school_id, &settings).await {
        Ok(run) => {
            metrics::counter!("training_runs_total", "status" => "completed").increment(1);
            Ok(run)
        }
        Err(err) => {
            let message = format!("{err:#}");
            if let Err(record_err) =
                record_failed_run(state.db(), school_id, &settings, &message).await
            {
                tracing::warn!(error = %record_err, "Failed to record failed training run");
            }
            metrics::counter!("training_runs_total", "status" => "failed").increment(1);
            tracing::warn!(school_id = ?school_id, error = %message, "Training run failed");
            Err(err)
        }
    }
}

async fn run_batch(
    state: &AppState,
    school_id: Option<&str>,
    settings: &EffectiveSettings,
) -> Result<TrainingRun, TrainingError> {
    let samples =
        repositories::training::eligible_samples(state.db(), school_id, TRAINING_BATCH_LIMIT)
            .await
            .context("load eligible training samples")?;
    if samples.len() < MIN_TRAINING_SAMPLES {
        return Err(TrainingError::InsufficientData);
    }

    let mut payloads = Vec::with_capacity(samples.len());
    let mut used_ids = Vec::with_capacity(samples.len());
    for sample in &samples {
        if let Some(payload) = sample_payload(sample, settings.ai_weight, settings.teacher_weight) {
            payloads.push(payload);
            used_ids.push(sample.id.clone());
        }
    }
    if payloads.len() < MIN_TRAINING_SAMPLES {
        return Err(TrainingError::InsufficientData);
    }

    let Some(client) = state.training() else {
        return Err(TrainingError::ProviderUnavailable);
    };
    let report = client
        .train(&payloads)
        .await
        .map_err(|err| TrainingError::ProviderFailed(format!("{err:#}")))?;
    if !report.success {
        let message = report
            .error
            .unwrap_or_else(|| "training provider reported a failure".to_string());
        return Err(TrainingError::ProviderFailed(message));
    }

    let now = primitive_now_utc();
    let run_id = Uuid::new_v4().to_string();
    let mut tx = state
        .db()
        .begin()
        .await
        .context("begin training run transaction")?;
    repositories::training::mark_samples_used(&mut *tx, &used_ids, now)
        .await
        .context("mark training samples used")?;
    let run = repositories::training::create_run(
        &mut *tx,
        CreateTrainingRun {
            id: &run_id,
            school_id,
            status: TrainingRunStatus::Completed,
            samples: report.samples.unwrap_or(payloads.len() as i64) as i32,
            accuracy: report.accuracy,
            mse: report.mse,
            mae: report.mae,
            ai_weight: settings.ai_weight,
            teacher_weight: settings.teacher_weight,
            error_message: None,
            created_at: now,
        },
    )
    .await
    .context("record completed training run")?;
    tx.commit().await.context("commit training run transaction")?;

    tracing::info!(
        run_id = %run.id,
        samples = run.samples,
        accuracy = ?run.accuracy,
        "Training run completed"
    );
    Ok(run)
}

fn sample_payload(
    sample: &TrainingSample,
    ai_weight: f64,
    teacher_weight: f64,
) -> Option<TrainingSamplePayload> {
    let target =
        blend_decision(sample.ai_score, sample.teacher_score).target(ai_weight, teacher_weight)?;
    let feedback = sample
        .teacher_feedback
        .clone()
        .or_else(|| sample.ai_feedback.clone())
        .unwrap_or_default();
    Some(TrainingSamplePayload {
        question: sample.question.clone(),
        answer: sample.answer.clone(),
        target_score: target,
        target_feedback: feedback,
    })
}

async fn record_failed_run(
    pool: &PgPool,
    school_id: Option<&str>,
    settings: &EffectiveSettings,
    message: &str,
) -> anyhow::Result<TrainingRun> {
    let run_id = Uuid::new_v4().to_string();
    let run = repositories::training::create_run(
        pool,
        CreateTrainingRun {
            id: &run_id,
            school_id,
            status: TrainingRunStatus::Failed,
            samples: 0,
            accuracy: None,
            mse: None,
            mae: None,
            ai_weight: settings.ai_weight,
            teacher_weight: settings.teacher_weight,
            error_message: Some(message),
            created_at: primitive_now_utc(),
        },
    )
    .await
    .context("record failed training run")?;
    Ok(run)
}

/// Captures a completed essay grade as a training sample, folding the
/// reviewer pair into any sample the AI suggestion already seeded.
pub(crate) async fn record_exam_sample(
    state: &AppState,
    task: &GradingTaskDetail,
    teacher_score: f64,
    teacher_feedback: Option<&str>,
) -> anyhow::Result<()> {
    let school_id = repositories::courses::find_by_id(state.db(), &task.course_id)
        .await
        .context("load course for training sample")?
        .and_then(|course| course.school_id);
    let now = primitive_now_utc();
    let sample_id = Uuid::new_v4().to_string();
    repositories::training::upsert_sample(
        state.db(),
        UpsertTrainingSample {
            id: &sample_id,
            question: &task.question_text,
            answer: &task.answer,
            ai_score: task.ai_score,
            ai_feedback: task.ai_feedback.as_deref(),
            teacher_score: Some(teacher_score),
            teacher_feedback,
            max_score: task.question_points,
            source_type: TrainingSource::Exam,
            source_id: &task.id,
            school_id: school_id.as_deref(),
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .context("record exam training sample")?;
    Ok(())
}

/// Captures a graded assignment submission as a training sample. The stored
/// document is not refetched here; the file name alone stands as the answer.
pub(crate) async fn record_assignment_sample(
    state: &AppState,
    submission: &AssignmentSubmissionDetail,
    teacher_score: f64,
    teacher_feedback: Option<&str>,
) -> anyhow::Result<()> {
    let db = state.db();
    let description = repositories::assignments::find_by_id(db, &submission.assignment_id)
        .await
        .context("load assignment for training sample")?
        .and_then(|assignment| assignment.description);
    let school_id = repositories::courses::find_by_id(db, &submission.course_id)
        .await
        .context("load course for training sample")?
        .and_then(|course| course.school_id);

    let question =
        ai_assist::assignment_question(&submission.assignment_title, description.as_deref());
    let answer = ai_assist::assignment_answer(&submission.file_name, None);
    let now = primitive_now_utc();
    let sample_id = Uuid::new_v4().to_string();
    repositories::training::upsert_sample(
        db,
        UpsertTrainingSample {
            id: &sample_id,
            question: &question,
            answer: &answer,
            ai_score: submission.ai_score,
            ai_feedback: submission.ai_feedback.as_deref(),
            teacher_score: Some(teacher_score),
            teacher_feedback,
            max_score: submission.max_score,
            source_type: TrainingSource::Assignment,
            source_id: &submission.id,
            school_id: school_id.as_deref(),
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .context("record assignment training sample")?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SyncOutcome {
    pub(crate) exam_tasks: i64,
    pub(crate) assignment_submissions: i64,
}

/// Backfills samples for grading data created before sample capture existed.
/// Picks up every task and submission holding an AI pair with no sample yet.
pub(crate) async fn sync_samples(
    state: &AppState,
    school_id: Option<&str>,
) -> anyhow::Result<SyncOutcome> {
    let db = state.db();
    let now = primitive_now_utc();

    let tasks = repositories::training::unsampled_grading_tasks(db, school_id)
        .await
        .context("load unsampled grading tasks")?;
    for task in &tasks {
        let sample_id = Uuid::new_v4().to_string();
        repositories::training::upsert_sample(
            db,
            UpsertTrainingSample {
                id: &sample_id,
                question: &task.question_text,
                answer: &task.answer,
                ai_score: task.ai_score,
                ai_feedback: task.ai_feedback.as_deref(),
                teacher_score: task.teacher_score,
                teacher_feedback: task.teacher_feedback.as_deref(),
                max_score: task.question_points,
                source_type: TrainingSource::Exam,
                source_id: &task.task_id,
                school_id: task.school_id.as_deref(),
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .context("sync exam training sample")?;
    }

    let submissions = repositories::training::unsampled_assignment_submissions(db, school_id)
        .await
        .context("load unsampled assignment submissions")?;
    for submission in &submissions {
        let question = ai_assist::assignment_question(
            &submission.assignment_title,
            submission.assignment_description.as_deref(),
        );
        let answer = ai_assist::assignment_answer(&submission.file_name, None);
        let sample_id = Uuid::new_v4().to_string();
        repositories::training::upsert_sample(
            db,
            UpsertTrainingSample {
                id: &sample_id,
                question: &question,
                answer: &answer,
                ai_score: submission.ai_score,
                ai_feedback: submission.ai_feedback.as_deref(),
                teacher_score: submission.score,
                teacher_feedback: submission.feedback.as_deref(),
                max_score: submission.max_score,
                source_type: TrainingSource::Assignment,
                source_id: &submission.submission_id,
                school_id: submission.school_id.as_deref(),
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .context("sync assignment training sample")?;
    }

    let outcome = SyncOutcome {
        exam_tasks: tasks.len() as i64,
        assignment_submissions: submissions.len() as i64,
    };
    tracing::info!(
        exam_tasks = outcome.exam_tasks,
        assignment_submissions = outcome.assignment_submissions,
        "Backfilled training samples"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use time::{Date, Month, PrimitiveDateTime, Time};

    use super::*;

    fn sample(ai: Option<(f64, &str)>, teacher: Option<(f64, &str)>) -> TrainingSample {
        let moment = PrimitiveDateTime::new(
            Date::from_calendar_date(2024, Month::March, 1).expect("valid date"),
            Time::MIDNIGHT,
        );
        TrainingSample {
            id: "sample-1".to_string(),
            question: "Explain photosynthesis".to_string(),
            answer: "Plants convert light into energy".to_string(),
            ai_score: ai.map(|(score, _)| score),
            ai_feedback: ai.map(|(_, feedback)| feedback.to_string()),
            teacher_score: teacher.map(|(score, _)| score),
            teacher_feedback: teacher.map(|(_, feedback)| feedback.to_string()),
            max_score: 10.0,
            source_type: TrainingSource::Exam,
            source_id: "task-1".to_string(),
            school_id: None,
            used_for_training: false,
            created_at: moment,
            updated_at: moment,
        }
    }

    #[test]
    fn differing_scores_blend() {
        let decision = blend_decision(Some(8.0), Some(6.0));
        assert_eq!(decision, BlendDecision::Blended { ai: 8.0, human: 6.0 });
        let target = decision.target(0.3, 0.7).expect("target");
        assert!((target - 6.6).abs() < 1e-9);
    }

    #[test]
    fn equal_scores_use_the_shared_value() {
        let decision = blend_decision(Some(7.0), Some(7.0));
        assert_eq!(decision, BlendDecision::OnlyHuman(7.0));
        assert_eq!(decision.target(0.3, 0.7), Some(7.0));
    }

    #[test]
    fn a_lone_score_is_used_directly() {
        assert_eq!(blend_decision(Some(9.0), None), BlendDecision::OnlyAi(9.0));
        assert_eq!(blend_decision(None, Some(4.0)), BlendDecision::OnlyHuman(4.0));
        assert_eq!(blend_decision(Some(9.0), None).target(0.3, 0.7), Some(9.0));
    }

    #[test]
    fn a_zero_reviewer_score_still_counts() {
        assert_eq!(blend_decision(None, Some(0.0)), BlendDecision::OnlyHuman(0.0));
    }

    #[test]
    fn scoreless_samples_are_excluded() {
        assert_eq!(blend_decision(None, None), BlendDecision::Excluded);
        assert_eq!(blend_decision(None, None).target(0.3, 0.7), None);
    }

    #[test]
    fn weights_must_sum_to_one() {
        assert!(weights_are_valid(0.3, 0.7));
        assert!(weights_are_valid(1.0, 0.0));
        assert!(weights_are_valid(0.3, 0.705));
        assert!(!weights_are_valid(0.5, 0.6));
        assert!(!weights_are_valid(-0.1, 1.1));
        assert!(!weights_are_valid(0.2, 0.2));
    }

    #[test]
    fn reviewer_feedback_wins_the_target_feedback() {
        let sample = sample(Some((8.0, "solid")), Some((6.0, "needs work")));
        let payload = sample_payload(&sample, 0.3, 0.7).expect("payload");
        assert_eq!(payload.target_feedback, "needs work");
        assert!((payload.target_score - 6.6).abs() < 1e-9);
    }

    #[test]
    fn ai_feedback_backfills_when_no_reviewer_wrote_any() {
        let sample = sample(Some((8.0, "solid")), None);
        let payload = sample_payload(&sample, 0.3, 0.7).expect("payload");
        assert_eq!(payload.target_feedback, "solid");
        assert_eq!(payload.target_score, 8.0);
    }
}
