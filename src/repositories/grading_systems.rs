use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{GradeCriterion, GradeWeight, GradingSystem};
use crate::db::types::{GradeCategory, GradingSystemType};

pub(crate) const COLUMNS: &str =
    "id, course_id, system_type, passing_score, created_at, updated_at";

const CRITERION_COLUMNS: &str =
    "id, grading_system_id, grade, min_score, created_at, updated_at";

const WEIGHT_COLUMNS: &str = "id, course_id, category, weight, created_at, updated_at";

pub(crate) struct CreateGradingSystem<'a> {
    pub(crate) id: &'a str,
    pub(crate) course_id: &'a str,
    pub(crate) system_type: GradingSystemType,
    pub(crate) passing_score: Option<f64>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) struct CreateGradeCriterion<'a> {
    pub(crate) id: &'a str,
    pub(crate) grading_system_id: &'a str,
    pub(crate) grade: &'a str,
    pub(crate) min_score: f64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) struct CreateGradeWeight<'a> {
    pub(crate) id: &'a str,
    pub(crate) course_id: &'a str,
    pub(crate) category: GradeCategory,
    pub(crate) weight: f64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn find_for_course(
    pool: &PgPool,
    course_id: &str,
) -> Result<Option<GradingSystem>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM grading_systems WHERE course_id = $1"
    ))
    .bind(course_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<GradingSystem>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM grading_systems WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateGradingSystem<'_>,
) -> Result<GradingSystem, sqlx::Error> {
    sqlx::query_as(&format!(
        "INSERT INTO grading_systems (id, course_id, system_type, passing_score, created_at, \
         updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.course_id)
    .bind(params.system_type)
    .bind(params.passing_score)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    system_type: GradingSystemType,
    passing_score: Option<f64>,
    now: PrimitiveDateTime,
) -> Result<Option<GradingSystem>, sqlx::Error> {
    sqlx::query_as(&format!(
        "UPDATE grading_systems SET system_type = $1, passing_score = $2, updated_at = $3 \
         WHERE id = $4 \
         RETURNING {COLUMNS}"
    ))
    .bind(system_type)
    .bind(passing_score)
    .bind(now)
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_criterion(
    pool: &PgPool,
    id: &str,
) -> Result<Option<GradeCriterion>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {CRITERION_COLUMNS} FROM grade_criteria WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Criteria ordered from the highest band down, the order grade resolution
/// walks them in.
pub(crate) async fn criteria_for_system(
    pool: &PgPool,
    grading_system_id: &str,
) -> Result<Vec<GradeCriterion>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {CRITERION_COLUMNS} FROM grade_criteria \
         WHERE grading_system_id = $1 ORDER BY min_score DESC"
    ))
    .bind(grading_system_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn create_criterion(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateGradeCriterion<'_>,
) -> Result<GradeCriterion, sqlx::Error> {
    sqlx::query_as(&format!(
        "INSERT INTO grade_criteria (id, grading_system_id, grade, min_score, created_at, \
         updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {CRITERION_COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.grading_system_id)
    .bind(params.grade)
    .bind(params.min_score)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn update_criterion(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    grade: &str,
    min_score: f64,
    now: PrimitiveDateTime,
) -> Result<Option<GradeCriterion>, sqlx::Error> {
    sqlx::query_as(&format!(
        "UPDATE grade_criteria SET grade = $1, min_score = $2, updated_at = $3 \
         WHERE id = $4 \
         RETURNING {CRITERION_COLUMNS}"
    ))
    .bind(grade)
    .bind(min_score)
    .bind(now)
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn delete_criterion(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM grade_criteria WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find_weight(
    pool: &PgPool,
    id: &str,
) -> Result<Option<GradeWeight>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {WEIGHT_COLUMNS} FROM grade_weights WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn weights_for_course(
    pool: &PgPool,
    course_id: &str,
) -> Result<Vec<GradeWeight>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {WEIGHT_COLUMNS} FROM grade_weights WHERE course_id = $1 ORDER BY category"
    ))
    .bind(course_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn weight_exists_for_category(
    executor: impl sqlx::PgExecutor<'_>,
    course_id: &str,
    category: GradeCategory,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM grade_weights WHERE course_id = $1 AND category = $2)",
    )
    .bind(course_id)
    .bind(category)
    .fetch_one(executor)
    .await
}

/// Sum of the course's weights with one row optionally left out, used to check
/// the 100-point ceiling before a create or update.
pub(crate) async fn total_weight_excluding(
    executor: impl sqlx::PgExecutor<'_>,
    course_id: &str,
    exclude_id: Option<&str>,
) -> Result<f64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(weight), 0) FROM grade_weights \
         WHERE course_id = $1 AND ($2::TEXT IS NULL OR id <> $2)",
    )
    .bind(course_id)
    .bind(exclude_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn create_weight(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateGradeWeight<'_>,
) -> Result<GradeWeight, sqlx::Error> {
    sqlx::query_as(&format!(
        "INSERT INTO grade_weights (id, course_id, category, weight, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {WEIGHT_COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.course_id)
    .bind(params.category)
    .bind(params.weight)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn update_weight(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    weight: f64,
    now: PrimitiveDateTime,
) -> Result<Option<GradeWeight>, sqlx::Error> {
    sqlx::query_as(&format!(
        "UPDATE grade_weights SET weight = $1, updated_at = $2 WHERE id = $3 \
         RETURNING {WEIGHT_COLUMNS}"
    ))
    .bind(weight)
    .bind(now)
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn delete_weight(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM grade_weights WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}
