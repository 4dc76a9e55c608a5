use anyhow::Context;
use thiserror::Error;
use time::{Duration, PrimitiveDateTime};

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::GradingTaskStatus;
use crate::repositories;
use crate::repositories::assignments::AssignmentSubmissionDetail;
use crate::repositories::grading_tasks::GradingTaskDetail;
use crate::services::ai_assist::{self, Suggestion};
use crate::services::training_pipeline;

#[derive(Debug, Error)]
pub(crate) enum GradingError {
    #[error("score must be between 0 and {max}")]
    InvalidScore { max: f64 },
    #[error("grading task was already completed")]
    AlreadyCompleted,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub(crate) enum SuggestError {
    #[error("AI grading is not configured")]
    Unavailable,
    #[error("a suggestion is already being generated")]
    InFlight,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Submission totals as they stand after a completion.
#[derive(Debug)]
pub(crate) struct CompletionOutcome {
    pub(crate) score: f64,
    pub(crate) percentage: f64,
    pub(crate) passed: Option<bool>,
    pub(crate) pending_tasks: i64,
}

#[derive(Debug)]
pub(crate) struct SuggestionOutcome {
    pub(crate) score: f64,
    pub(crate) feedback: String,
    pub(crate) cached: bool,
}

/// Folds a reviewer's verdict into the submission.
///
/// The submission row is locked for the duration of the transaction, so two
/// reviewers finishing different essays of the same submission recompute the
/// totals one after the other. The pass flag stays withheld until the last
/// pending task is in.
pub(crate) async fn complete_task(
    state: &AppState,
    task: &GradingTaskDetail,
    reviewer_id: &str,
    score: f64,
    feedback: Option<&str>,
) -> Result<CompletionOutcome, GradingError> {
    if !(0.0..=task.question_points).contains(&score) {
        return Err(GradingError::InvalidScore { max: task.question_points });
    }

    let assessment = repositories::assessments::find_by_id(state.db(), &task.assessment_id)
        .await
        .context("Failed to fetch assessment")?
        .ok_or_else(|| anyhow::anyhow!("assessment {} no longer exists", task.assessment_id))?;

    let now = primitive_now_utc();
    let mut tx = state
        .db()
        .begin()
        .await
        .context("Failed to begin transaction")?;

    let submission = repositories::submissions::lock_by_id(&mut *tx, &task.submission_id)
        .await
        .context("Failed to lock submission")?
        .ok_or_else(|| anyhow::anyhow!("submission {} no longer exists", task.submission_id))?;

    let completed =
        repositories::grading_tasks::complete(&mut *tx, &task.id, score, feedback, reviewer_id, now)
            .await
            .context("Failed to complete grading task")?;
    if !completed {
        return Err(GradingError::AlreadyCompleted);
    }

    let objective = repositories::submissions::objective_points_total(&mut *tx, &submission.id)
        .await
        .context("Failed to sum auto-evaluated points")?;
    let essays = repositories::grading_tasks::completed_scores_total(&mut *tx, &submission.id)
        .await
        .context("Failed to sum completed essay scores")?;
    let pending = repositories::grading_tasks::pending_count_for_submission(&mut *tx, &submission.id)
        .await
        .context("Failed to count pending grading tasks")?;

    let aggregate = aggregate_submission(
        objective,
        essays,
        submission.max_score,
        pending,
        assessment.passing_score,
    );
    repositories::submissions::apply_aggregate(
        &mut *tx,
        &submission.id,
        aggregate.score,
        aggregate.percentage,
        aggregate.passed,
        now,
    )
    .await
    .context("Failed to update submission totals")?;

    tx.commit().await.context("Failed to commit grading")?;

    metrics::counter!("grading_completions_total", "kind" => "exam").increment(1);
    tracing::info!(
        task_id = %task.id,
        submission_id = %submission.id,
        score = aggregate.score,
        pending_tasks = pending,
        "Grading task completed"
    );

    if let Err(err) = training_pipeline::record_exam_sample(state, task, score, feedback).await {
        tracing::warn!(task_id = %task.id, error = %err, "Failed to record training sample");
    }

    Ok(CompletionOutcome {
        score: aggregate.score,
        percentage: aggregate.percentage,
        passed: aggregate.passed,
        pending_tasks: pending,
    })
}

#[derive(Debug, PartialEq)]
pub(crate) struct SubmissionAggregate {
    pub(crate) score: f64,
    pub(crate) percentage: f64,
    pub(crate) passed: Option<bool>,
}

/// Recomputes submission totals from the auto-evaluated points and every
/// completed essay score. `passed` is decided only once no task is pending.
pub(crate) fn aggregate_submission(
    objective_points: f64,
    essay_points: f64,
    max_score: f64,
    pending_tasks: i64,
    passing_score: f64,
) -> SubmissionAggregate {
    let score = objective_points + essay_points;
    let percentage = if max_score > 0.0 {
        score / max_score * 100.0
    } else {
        0.0
    };
    let passed = if pending_tasks == 0 {
        Some(percentage >= passing_score)
    } else {
        None
    };

    SubmissionAggregate { score, percentage, passed }
}

/// Fills in the AI suggestion for a pending task when none is stored yet.
///
/// Returns the suggestion when one exists or could be produced right now, and
/// None when the assistant is unconfigured, another request holds the claim, or
/// the upstream call failed. A reviewer can always grade without one.
pub(crate) async fn ensure_task_suggestion(
    state: &AppState,
    task: &GradingTaskDetail,
) -> anyhow::Result<Option<Suggestion>> {
    if let Some(score) = task.ai_score {
        return Ok(Some(Suggestion {
            score,
            feedback: task.ai_feedback.clone().unwrap_or_default(),
        }));
    }
    if task.status != GradingTaskStatus::Pending {
        return Ok(None);
    }
    let Some(assist) = state.ai_assist() else {
        return Ok(None);
    };

    let now = primitive_now_utc();
    let claimed = repositories::grading_tasks::claim_for_suggestion(
        state.db(),
        &task.id,
        now,
        stale_cutoff(state, now),
    )
    .await
    .context("Failed to claim suggestion slot")?;
    if !claimed {
        return Ok(None);
    }

    match assist
        .suggest(&task.question_text, &task.answer, task.question_points)
        .await
    {
        Ok(suggestion) => {
            repositories::grading_tasks::store_suggestion(
                state.db(),
                &task.id,
                suggestion.score,
                &suggestion.feedback,
                now,
            )
            .await
            .context("Failed to store suggestion")?;
            metrics::counter!("ai_suggestions_total", "source" => "exam", "outcome" => "success")
                .increment(1);
            Ok(Some(suggestion))
        }
        Err(err) => {
            tracing::warn!(task_id = %task.id, error = %err, "AI suggestion request failed");
            metrics::counter!("ai_suggestions_total", "source" => "exam", "outcome" => "failed")
                .increment(1);
            repositories::grading_tasks::release_claim(state.db(), &task.id)
                .await
                .context("Failed to release suggestion claim")?;
            Ok(None)
        }
    }
}

/// Produces an AI suggestion for an assignment submission, reusing the stored
/// one unless the caller asks for a regeneration.
pub(crate) async fn suggest_assignment(
    state: &AppState,
    submission: &AssignmentSubmissionDetail,
    regenerate: bool,
) -> Result<SuggestionOutcome, SuggestError> {
    let Some(assist) = state.ai_assist() else {
        return Err(SuggestError::Unavailable);
    };

    if !regenerate {
        if let Some(score) = submission.ai_score {
            return Ok(SuggestionOutcome {
                score,
                feedback: submission.ai_feedback.clone().unwrap_or_default(),
                cached: true,
            });
        }
    }

    let assignment = repositories::assignments::find_by_id(state.db(), &submission.assignment_id)
        .await
        .context("Failed to fetch assignment")?
        .ok_or_else(|| anyhow::anyhow!("assignment {} no longer exists", submission.assignment_id))?;

    let now = primitive_now_utc();
    if regenerate {
        repositories::assignments::reset_suggestion(state.db(), &submission.id, now)
            .await
            .context("Failed to reset suggestion")?;
    }

    let claimed = repositories::assignments::claim_for_suggestion(
        state.db(),
        &submission.id,
        now,
        stale_cutoff(state, now),
    )
    .await
    .context("Failed to claim suggestion slot")?;
    if !claimed {
        return Err(SuggestError::InFlight);
    }

    let document_text = fetch_document_text(state, submission).await;
    let question = ai_assist::assignment_question(&assignment.title, assignment.description.as_deref());
    let answer = ai_assist::assignment_answer(&submission.file_name, document_text.as_deref());

    match assist.suggest(&question, &answer, submission.max_score).await {
        Ok(suggestion) => {
            repositories::assignments::store_suggestion(
                state.db(),
                &submission.id,
                suggestion.score,
                &suggestion.feedback,
                now,
            )
            .await
            .context("Failed to store suggestion")?;
            metrics::counter!(
                "ai_suggestions_total",
                "source" => "assignment",
                "outcome" => "success"
            )
            .increment(1);
            Ok(SuggestionOutcome {
                score: suggestion.score,
                feedback: suggestion.feedback,
                cached: false,
            })
        }
        Err(err) => {
            metrics::counter!(
                "ai_suggestions_total",
                "source" => "assignment",
                "outcome" => "failed"
            )
            .increment(1);
            repositories::assignments::release_claim(state.db(), &submission.id)
                .await
                .context("Failed to release suggestion claim")?;
            Err(SuggestError::Internal(err.context("AI suggestion request failed")))
        }
    }
}

/// Records the reviewer's score for an assignment submission. Re-grading is
/// allowed and overwrites the previous verdict.
pub(crate) async fn grade_assignment(
    state: &AppState,
    submission: &AssignmentSubmissionDetail,
    reviewer_id: &str,
    score: f64,
    feedback: Option<&str>,
) -> Result<(), GradingError> {
    if !(0.0..=submission.max_score).contains(&score) {
        return Err(GradingError::InvalidScore { max: submission.max_score });
    }

    let now = primitive_now_utc();
    let graded = repositories::assignments::grade(
        state.db(),
        &submission.id,
        score,
        feedback,
        reviewer_id,
        now,
    )
    .await
    .context("Failed to record assignment grade")?;
    if !graded {
        return Err(GradingError::Internal(anyhow::anyhow!(
            "assignment submission {} no longer exists",
            submission.id
        )));
    }

    metrics::counter!("grading_completions_total", "kind" => "assignment").increment(1);
    tracing::info!(
        submission_id = %submission.id,
        assignment_id = %submission.assignment_id,
        score,
        "Assignment submission graded"
    );

    if let Err(err) =
        training_pipeline::record_assignment_sample(state, submission, score, feedback).await
    {
        tracing::warn!(
            submission_id = %submission.id,
            error = %err,
            "Failed to record training sample"
        );
    }

    Ok(())
}

fn stale_cutoff(state: &AppState, now: PrimitiveDateTime) -> PrimitiveDateTime {
    now - Duration::seconds(state.settings().ai_assist().claim_stale_seconds as i64)
}

async fn fetch_document_text(
    state: &AppState,
    submission: &AssignmentSubmissionDetail,
) -> Option<String> {
    let storage = state.storage()?;
    let file_key = submission.file_key.as_deref()?;
    if !ai_assist::is_text_document(&submission.file_name) {
        return None;
    }

    match storage.fetch_bytes(file_key).await {
        Ok(bytes) => String::from_utf8(bytes).ok(),
        Err(err) => {
            tracing::warn!(file_key, error = %err, "Failed to fetch submission document");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_essay_folds_into_the_totals() {
        let aggregate = aggregate_submission(10.0, 4.0, 15.0, 0, 60.0);

        assert_eq!(aggregate.score, 14.0);
        assert!((aggregate.percentage - 14.0 / 15.0 * 100.0).abs() < 1e-9);
        assert_eq!(aggregate.passed, Some(true));
    }

    #[test]
    fn pass_flag_is_withheld_while_tasks_are_pending() {
        let aggregate = aggregate_submission(10.0, 4.0, 20.0, 2, 60.0);

        assert_eq!(aggregate.score, 14.0);
        assert_eq!(aggregate.passed, None);
    }

    #[test]
    fn threshold_is_inclusive() {
        let aggregate = aggregate_submission(6.0, 0.0, 10.0, 0, 60.0);

        assert_eq!(aggregate.passed, Some(true));
    }

    #[test]
    fn short_totals_fail() {
        let aggregate = aggregate_submission(5.0, 0.5, 10.0, 0, 60.0);

        assert_eq!(aggregate.passed, Some(false));
    }

    #[test]
    fn empty_submission_does_not_divide_by_zero() {
        let aggregate = aggregate_submission(0.0, 0.0, 0.0, 0, 60.0);

        assert_eq!(aggregate.percentage, 0.0);
        assert_eq!(aggregate.passed, Some(false));
    }
}
