use sqlx::PgPool;

use crate::db::models::Course;

const COLUMNS: &str =
    "id, school_id, instructor_id, title, description, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!("SELECT {COLUMNS} FROM courses WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn is_enrolled(
    pool: &PgPool,
    course_id: &str,
    student_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM course_students WHERE course_id = $1 AND student_id = $2
        )",
    )
    .bind(course_id)
    .bind(student_id)
    .fetch_one(pool)
    .await
}

/// Instructor of the course, or a co-teacher whose membership carries the
/// grading flag.
pub(crate) async fn has_grading_rights(
    pool: &PgPool,
    course_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM courses WHERE id = $1 AND instructor_id = $2
        ) OR EXISTS (
            SELECT 1 FROM course_teachers
            WHERE course_id = $1 AND teacher_id = $2 AND grading = TRUE
        )",
    )
    .bind(course_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
}

/// Courses the user can grade in: own courses plus co-taught ones carrying
/// the grading flag.
pub(crate) async fn grading_course_ids(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT id FROM courses WHERE instructor_id = $1
         UNION
         SELECT course_id FROM course_teachers WHERE teacher_id = $1 AND grading = TRUE",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}
