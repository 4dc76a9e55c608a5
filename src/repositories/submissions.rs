use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{Submission, SubmissionAnswer};
use crate::db::types::{AssessmentKind, GradingTaskStatus};

pub(crate) const COLUMNS: &str = "\
    id, assessment_id, student_id, score, max_score, percentage, passed, \
    time_spent_minutes, submitted_at, created_at, updated_at";

const ANSWER_COLUMNS: &str =
    "id, submission_id, question_id, answer, is_correct, points, created_at";

pub(crate) struct CreateSubmission<'a> {
    pub(crate) id: &'a str,
    pub(crate) assessment_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) percentage: f64,
    pub(crate) passed: Option<bool>,
    pub(crate) time_spent_minutes: Option<i32>,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) struct CreateAnswer<'a> {
    pub(crate) id: &'a str,
    pub(crate) submission_id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) answer: &'a str,
    pub(crate) is_correct: Option<bool>,
    pub(crate) points: Option<f64>,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn find_for_student(
    pool: &PgPool,
    assessment_id: &str,
    student_id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE assessment_id = $1 AND student_id = $2"
    ))
    .bind(assessment_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await
}

/// Row lock used to serialize concurrent grading-task completions for one submission.
pub(crate) async fn lock_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Inserts the submission unless the student already has one for the
/// assessment. Returns None on the duplicate, which callers reject.
pub(crate) async fn create_if_absent(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateSubmission<'_>,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as(&format!(
        "INSERT INTO submissions (id, assessment_id, student_id, score, max_score, percentage, \
         passed, time_spent_minutes, submitted_at, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (assessment_id, student_id) DO NOTHING \
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.assessment_id)
    .bind(params.student_id)
    .bind(params.score)
    .bind(params.max_score)
    .bind(params.percentage)
    .bind(params.passed)
    .bind(params.time_spent_minutes)
    .bind(params.submitted_at)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn create_answer(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAnswer<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO submission_answers (id, submission_id, question_id, answer, is_correct, \
         points, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(params.id)
    .bind(params.submission_id)
    .bind(params.question_id)
    .bind(params.answer)
    .bind(params.is_correct)
    .bind(params.points)
    .bind(params.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn answers_for_submission(
    pool: &PgPool,
    submission_id: &str,
) -> Result<Vec<SubmissionAnswer>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {ANSWER_COLUMNS} FROM submission_answers WHERE submission_id = $1 ORDER BY created_at"
    ))
    .bind(submission_id)
    .fetch_all(pool)
    .await
}

/// Sum of points already awarded to auto-evaluated answers. Essay answers carry
/// NULL points until their grading task completes, so they drop out of the sum.
pub(crate) async fn objective_points_total(
    executor: impl sqlx::PgExecutor<'_>,
    submission_id: &str,
) -> Result<f64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(points), 0) FROM submission_answers \
         WHERE submission_id = $1 AND points IS NOT NULL",
    )
    .bind(submission_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn apply_aggregate(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    score: f64,
    percentage: f64,
    passed: Option<bool>,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE submissions SET score = $1, percentage = $2, passed = $3, updated_at = $4 \
         WHERE id = $5",
    )
    .bind(score)
    .bind(percentage)
    .bind(passed)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Percentages of a student's fully graded submissions for the given assessment
/// kinds in one course. Submissions with pending grading tasks are excluded so a
/// half-graded exam never drags the course grade down.
pub(crate) async fn finalized_percentages(
    pool: &PgPool,
    course_id: &str,
    student_id: &str,
    kinds: &[AssessmentKind],
) -> Result<Vec<f64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT s.percentage FROM submissions s \
         JOIN assessments a ON a.id = s.assessment_id \
         WHERE a.course_id = $1 AND s.student_id = $2 AND a.kind = ANY($3) \
         AND NOT EXISTS (\
             SELECT 1 FROM grading_tasks gt \
             WHERE gt.submission_id = s.id AND gt.status = $4\
         )",
    )
    .bind(course_id)
    .bind(student_id)
    .bind(kinds)
    .bind(GradingTaskStatus::Pending)
    .fetch_all(pool)
    .await
}
