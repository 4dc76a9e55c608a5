use sqlx::PgPool;

use crate::db::models::{Assessment, AssessmentQuestion, QuestionOption};

const COLUMNS: &str = "\
    id, course_id, kind, title, description, start_date, end_date, \
    duration_minutes, passing_score, created_at, updated_at";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<Assessment>, sqlx::Error> {
    sqlx::query_as::<_, Assessment>(&format!("SELECT {COLUMNS} FROM assessments WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Questions referenced by the assessment, in assessment order.
pub(crate) async fn questions_for_assessment(
    pool: &PgPool,
    assessment_id: &str,
) -> Result<Vec<AssessmentQuestion>, sqlx::Error> {
    sqlx::query_as::<_, AssessmentQuestion>(
        "SELECT aq.question_id, aq.order_index, q.kind, q.text, q.points, q.explanation
         FROM assessment_questions aq
         JOIN questions q ON q.id = aq.question_id
         WHERE aq.assessment_id = $1
         ORDER BY aq.order_index",
    )
    .bind(assessment_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn options_for_questions(
    pool: &PgPool,
    question_ids: &[String],
) -> Result<Vec<QuestionOption>, sqlx::Error> {
    if question_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, QuestionOption>(
        "SELECT id, question_id, text, is_correct, order_index
         FROM question_options
         WHERE question_id = ANY($1)
         ORDER BY question_id, order_index",
    )
    .bind(question_ids)
    .fetch_all(pool)
    .await
}
