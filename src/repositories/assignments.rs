use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Assignment;
use crate::db::types::AssignmentSubmissionStatus;
use crate::repositories::ReviewScope;

const COLUMNS: &str =
    "id, course_id, title, description, max_score, due_date, created_at, updated_at";

const DETAIL_COLUMNS: &str = "\
    asub.id, asub.assignment_id, asub.student_id, asub.file_key, asub.file_name, \
    asub.file_size, asub.ai_score, asub.ai_feedback, asub.score, asub.feedback, \
    asub.graded_by, asub.graded_at, asub.status, asub.submitted_at, \
    ag.title AS assignment_title, ag.max_score, u.full_name AS student_name, \
    c.id AS course_id, c.title AS course_title";

const DETAIL_FROM: &str = "\
    FROM assignment_submissions asub \
    JOIN assignments ag ON ag.id = asub.assignment_id \
    JOIN users u ON u.id = asub.student_id \
    JOIN courses c ON c.id = ag.course_id";

/// Assignment submission joined with the context a reviewer needs on screen.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AssignmentSubmissionDetail {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) student_id: String,
    pub(crate) file_key: Option<String>,
    pub(crate) file_name: String,
    pub(crate) file_size: i64,
    pub(crate) ai_score: Option<f64>,
    pub(crate) ai_feedback: Option<String>,
    pub(crate) score: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_by: Option<String>,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    pub(crate) status: AssignmentSubmissionStatus,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) assignment_title: String,
    pub(crate) max_score: f64,
    pub(crate) student_name: String,
    pub(crate) course_id: String,
    pub(crate) course_title: String,
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM assignments WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_submission_detail(
    pool: &PgPool,
    id: &str,
) -> Result<Option<AssignmentSubmissionDetail>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {DETAIL_COLUMNS} {DETAIL_FROM} WHERE asub.id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_detailed(
    pool: &PgPool,
    scope: &ReviewScope,
    status: AssignmentSubmissionStatus,
    skip: i64,
    limit: i64,
) -> Result<Vec<AssignmentSubmissionDetail>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {DETAIL_COLUMNS} {DETAIL_FROM} WHERE asub.status = "
    ));
    builder.push_bind(status);
    push_scope(&mut builder, scope);

    builder.push(" ORDER BY asub.submitted_at OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder
        .build_query_as::<AssignmentSubmissionDetail>()
        .fetch_all(pool)
        .await
}

pub(crate) async fn count_by_status(
    pool: &PgPool,
    scope: &ReviewScope,
    status: AssignmentSubmissionStatus,
) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT COUNT(*) {DETAIL_FROM} WHERE asub.status = "
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

/// Percentages of a student's graded assignment work in one course.
pub(crate) async fn graded_percentages(
    pool: &PgPool,
    course_id: &str,
    student_id: &str,
) -> Result<Vec<f64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT CASE WHEN ag.max_score > 0 THEN asub.score / ag.max_score * 100.0 ELSE 0.0 END \
         FROM assignment_submissions asub \
         JOIN assignments ag ON ag.id = asub.assignment_id \
         WHERE ag.course_id = $1 AND asub.student_id = $2 AND asub.status = $3 \
         AND asub.score IS NOT NULL",
    )
    .bind(course_id)
    .bind(student_id)
    .bind(AssignmentSubmissionStatus::Graded)
    .fetch_all(pool)
    .await
}

/// Same claim discipline as grading tasks: one upstream AI call per submission
/// while the stored suggestion is absent.
pub(crate) async fn claim_for_suggestion(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
    stale_before: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE assignment_submissions SET ai_claimed_at = $1 \
         WHERE id = $2 AND ai_score IS NULL \
         AND (ai_claimed_at IS NULL OR ai_claimed_at < $3)",
    )
    .bind(now)
    .bind(id)
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
        "UPDATE assignment_submissions SET ai_score = $1, ai_feedback = $2, updated_at = $3 \
         WHERE id = $4",
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
    sqlx::query(
        "UPDATE assignment_submissions SET ai_claimed_at = NULL \
         WHERE id = $1 AND ai_score IS NULL",
    )
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Drops the stored suggestion so the next request regenerates it.
pub(crate) async fn reset_suggestion(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE assignment_submissions SET ai_score = NULL, ai_feedback = NULL, \
         ai_claimed_at = NULL, updated_at = $1 WHERE id = $2",
    )
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Records the reviewer's verdict. Grading is repeatable: a second call simply
/// overwrites the previous score and feedback.
pub(crate) async fn grade(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    score: f64,
    feedback: Option<&str>,
    graded_by: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE assignment_submissions SET score = $1, feedback = $2, graded_by = $3, \
         graded_at = $4, status = $5, updated_at = $4 \
         WHERE id = $6",
    )
    .bind(score)
    .bind(feedback)
    .bind(graded_by)
    .bind(now)
    .bind(AssignmentSubmissionStatus::Graded)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}
