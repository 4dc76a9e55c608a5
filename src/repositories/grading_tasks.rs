use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::types::GradingTaskStatus;
use crate::repositories::ReviewScope;

const DETAIL_COLUMNS: &str = "\
    gt.id, gt.submission_id, gt.question_id, gt.student_id, gt.answer, gt.ai_score, \
    gt.ai_feedback, gt.teacher_score, gt.teacher_feedback, gt.graded_by, gt.status, \
    gt.created_at, q.text AS question_text, q.points AS question_points, \
    u.full_name AS student_name, a.id AS assessment_id, a.title AS assessment_title, \
    c.id AS course_id, c.title AS course_title";

const DETAIL_FROM: &str = "\
    FROM grading_tasks gt \
    JOIN questions q ON q.id = gt.question_id \
    JOIN users u ON u.id = gt.student_id \
    JOIN submissions s ON s.id = gt.submission_id \
    JOIN assessments a ON a.id = s.assessment_id \
    JOIN courses c ON c.id = a.course_id";

pub(crate) struct CreateGradingTask<'a> {
    pub(crate) id: &'a str,
    pub(crate) submission_id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) answer: &'a str,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Grading task joined with the context a reviewer needs on screen.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct GradingTaskDetail {
    pub(crate) id: String,
    pub(crate) submission_id: String,
    pub(crate) question_id: String,
    pub(crate) student_id: String,
    pub(crate) answer: String,
    pub(crate) ai_score: Option<f64>,
    pub(crate) ai_feedback: Option<String>,
    pub(crate) teacher_score: Option<f64>,
    pub(crate) teacher_feedback: Option<String>,
    pub(crate) graded_by: Option<String>,
    pub(crate) status: GradingTaskStatus,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) question_text: String,
    pub(crate) question_points: f64,
    pub(crate) student_name: String,
    pub(crate) assessment_id: String,
    pub(crate) assessment_title: String,
    pub(crate) course_id: String,
    pub(crate) course_title: String,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    task: CreateGradingTask<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO grading_tasks (id, submission_id, question_id, student_id, answer, \
         created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(task.id)
    .bind(task.submission_id)
    .bind(task.question_id)
    .bind(task.student_id)
    .bind(task.answer)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_detail(
    pool: &PgPool,
    id: &str,
) -> Result<Option<GradingTaskDetail>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {DETAIL_COLUMNS} {DETAIL_FROM} WHERE gt.id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_detailed(
    pool: &PgPool,
    scope: &ReviewScope,
    status: GradingTaskStatus,
    skip: i64,
    limit: i64,
) -> Result<Vec<GradingTaskDetail>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {DETAIL_COLUMNS} {DETAIL_FROM} WHERE gt.status = "
    ));
    builder.push_bind(status);
    push_scope(&mut builder, scope);

    builder.push(" ORDER BY gt.created_at OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder
        .build_query_as::<GradingTaskDetail>()
        .fetch_all(pool)
        .await
}

pub(crate) async fn count_by_status(
    pool: &PgPool,
    scope: &ReviewScope,
    status: GradingTaskStatus,
) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT COUNT(*) {DETAIL_FROM} WHERE gt.status = "
    ));
    builder.push_bind(status);
    push_scope(&mut builder, scope);

    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

fn push_scope<'a>(builder: &mut QueryBuilder<'a, Postgres>, scope: &'a ReviewScope) {
    match scope {
        ReviewScope::All => {}
        ReviewScope::School(school_id) => {
            builder.push(" AND c.school_id = ");
            builder.push_bind(school_id);
        }
        ReviewScope::Courses(course_ids) => {
            builder.push(" AND c.id = ANY(");
            builder.push_bind(course_ids.as_slice());
            builder.push(")");
        }
    }
}

pub(crate) async fn pending_count_for_submission(
    executor: impl sqlx::PgExecutor<'_>,
    submission_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM grading_tasks WHERE submission_id = $1 AND status = $2",
    )
    .bind(submission_id)
    .bind(GradingTaskStatus::Pending)
    .fetch_one(executor)
    .await
}

pub(crate) async fn completed_scores_total(
    executor: impl sqlx::PgExecutor<'_>,
    submission_id: &str,
) -> Result<f64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(teacher_score), 0) FROM grading_tasks \
         WHERE submission_id = $1 AND status = $2",
    )
    .bind(submission_id)
    .bind(GradingTaskStatus::Completed)
    .fetch_one(executor)
    .await
}

/// Atomically claims the right to request one AI suggestion for the task.
///
/// The claim succeeds only while no suggestion is stored and no other worker
/// holds a fresh claim, so concurrent reviewers opening the same task trigger a
/// single upstream call. Claims older than `stale_before` are treated as
/// abandoned and may be taken over.
pub(crate) async fn claim_for_suggestion(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
    stale_before: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE grading_tasks SET ai_claimed_at = $1 \
         WHERE id = $2 AND status = $3 AND ai_score IS NULL \
         AND (ai_claimed_at IS NULL OR ai_claimed_at < $4)",
    )
    .bind(now)
    .bind(id)
    .bind(GradingTaskStatus::Pending)
    .bind(stale_before)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn store_suggestion(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    score: f64,
    feedback: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE grading_tasks SET ai_score = $1, ai_feedback = $2, updated_at = $3 WHERE id = $4",
    )
    .bind(score)
    .bind(feedback)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn release_claim(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE grading_tasks SET ai_claimed_at = NULL WHERE id = $1 AND ai_score IS NULL")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Records the reviewer's final verdict. Returns false when the task was
/// already completed, which callers surface as a conflict.
pub(crate) async fn complete(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    score: f64,
    feedback: Option<&str>,
    graded_by: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE grading_tasks SET teacher_score = $1, teacher_feedback = $2, graded_by = $3, \
         status = $4, updated_at = $5 \
         WHERE id = $6 AND status = $7",
    )
    .bind(score)
    .bind(feedback)
    .bind(graded_by)
    .bind(GradingTaskStatus::Completed)
    .bind(now)
    .bind(id)
    .bind(GradingTaskStatus::Pending)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}
