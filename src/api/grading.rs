use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{self, CurrentUser};
use crate::api::pagination::{default_limit, PaginatedResponse};
use crate::core::state::AppState;
use crate::db::types::{AssignmentSubmissionStatus, GradingTaskStatus};
use crate::repositories;
use crate::repositories::assignments::AssignmentSubmissionDetail;
use crate::schemas::grading::{
    AssignmentSubmissionResponse, CompletedTaskResponse, CompleteGradingTaskRequest,
    GradeAssignmentRequest, GradingTaskResponse, SuggestionResponse,
};
use crate::services::grading_workflow::{self, GradingError, SuggestError};

const FILE_URL_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
pub(crate) struct TaskListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    status: Option<GradingTaskStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignmentListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    status: Option<AssignmentSubmissionStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SuggestQuery {
    #[serde(default)]
    regenerate: bool,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks))
        .route("/tasks/:task_id", get(get_task).patch(complete_task))
        .route("/assignments", get(list_assignment_submissions))
        .route(
            "/assignments/:submission_id",
            get(get_assignment_submission).patch(grade_assignment_submission),
        )
        .route("/assignments/:submission_id/suggestion", post(suggest_for_assignment))
}

async fn list_tasks(
    Query(params): Query<TaskListQuery>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<GradingTaskResponse>>, ApiError> {
    let scope = guards::review_scope(&state, &user).await?;
    let status = params.status.unwrap_or(GradingTaskStatus::Pending);
    let skip = params.skip.max(0);
    let limit = params.limit.clamp(1, 1000);

    let tasks = repositories::grading_tasks::list_detailed(state.db(), &scope, status, skip, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list grading tasks"))?;
    let total_count = repositories::grading_tasks::count_by_status(state.db(), &scope, status)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count grading tasks"))?;

    Ok(Json(PaginatedResponse {
        items: tasks.into_iter().map(GradingTaskResponse::from_detail).collect(),
        total_count,
        skip,
        limit,
    }))
}

async fn get_task(
    Path(task_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<GradingTaskResponse>, ApiError> {
    let detail = repositories::grading_tasks::find_detail(state.db(), &task_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch grading task"))?;

    let Some(mut detail) = detail else {
        return Err(ApiError::NotFound("Grading task not found".to_string()));
    };
    guards::require_review_access(&state, &user, &detail.course_id).await?;

    // A failed suggestion never blocks the reviewer from seeing the task.
    match grading_workflow::ensure_task_suggestion(&state, &detail).await {
        Ok(Some(suggestion)) => {
            detail.ai_score = Some(suggestion.score);
            detail.ai_feedback = Some(suggestion.feedback);
        }
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(task_id = %detail.id, error = %err, "Failed to prepare AI suggestion");
        }
    }

    Ok(Json(GradingTaskResponse::from_detail(detail)))
}

async fn complete_task(
    Path(task_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<CompleteGradingTaskRequest>,
) -> Result<Json<CompletedTaskResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let detail = repositories::grading_tasks::find_detail(state.db(), &task_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch grading task"))?;

    let Some(detail) = detail else {
        return Err(ApiError::NotFound("Grading task not found".to_string()));
    };
    guards::require_review_access(&state, &user, &detail.course_id).await?;

    let outcome = grading_workflow::complete_task(
        &state,
        &detail,
        &user.id,
        payload.score,
        payload.feedback.as_deref(),
    )
    .await
    .map_err(|err| match err {
        GradingError::InvalidScore { .. } => ApiError::BadRequest(err.to_string()),
        GradingError::AlreadyCompleted => {
            ApiError::Conflict("Grading task was already completed".to_string())
        }
        GradingError::Internal(e) => ApiError::internal(e, "Failed to complete grading task"),
    })?;

    let updated = repositories::grading_tasks::find_detail(state.db(), &task_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch completed grading task"))?
        .ok_or_else(|| ApiError::NotFound("Grading task not found".to_string()))?;

    Ok(Json(CompletedTaskResponse {
        task: GradingTaskResponse::from_detail(updated),
        submission_score: outcome.score,
        submission_percentage: outcome.percentage,
        submission_passed: outcome.passed,
        pending_grading_tasks: outcome.pending_tasks,
    }))
}

async fn list_assignment_submissions(
    Query(params): Query<AssignmentListQuery>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<AssignmentSubmissionResponse>>, ApiError> {
    let scope = guards::review_scope(&state, &user).await?;
    let status = params.status.unwrap_or(AssignmentSubmissionStatus::Submitted);
    let skip = params.skip.max(0);
    let limit = params.limit.clamp(1, 1000);

    let submissions =
        repositories::assignments::list_detailed(state.db(), &scope, status, skip, limit)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list assignment submissions"))?;
    let total_count = repositories::assignments::count_by_status(state.db(), &scope, status)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count assignment submissions"))?;

    Ok(Json(PaginatedResponse {
        items: submissions
            .into_iter()
            .map(|detail| AssignmentSubmissionResponse::from_detail(detail, None))
            .collect(),
        total_count,
        skip,
        limit,
    }))
}

async fn get_assignment_submission(
    Path(submission_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AssignmentSubmissionResponse>, ApiError> {
    let detail = repositories::assignments::find_submission_detail(state.db(), &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch assignment submission"))?;

    let Some(detail) = detail else {
        return Err(ApiError::NotFound("Assignment submission not found".to_string()));
    };
    guards::require_review_access(&state, &user, &detail.course_id).await?;

    let file_url = presigned_file_url(&state, &detail).await;
    Ok(Json(AssignmentSubmissionResponse::from_detail(detail, file_url)))
}

async fn grade_assignment_submission(
    Path(submission_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<GradeAssignmentRequest>,
) -> Result<Json<AssignmentSubmissionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let detail = repositories::assignments::find_submission_detail(state.db(), &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch assignment submission"))?;

    let Some(detail) = detail else {
        return Err(ApiError::NotFound("Assignment submission not found".to_string()));
    };
    guards::require_review_access(&state, &user, &detail.course_id).await?;

    grading_workflow::grade_assignment(
        &state,
        &detail,
        &user.id,
        payload.score,
        payload.feedback.as_deref(),
    )
    .await
    .map_err(|err| match err {
        GradingError::InvalidScore { .. } => ApiError::BadRequest(err.to_string()),
        GradingError::AlreadyCompleted => {
            ApiError::Conflict("Assignment submission was already graded".to_string())
        }
        GradingError::Internal(e) => ApiError::internal(e, "Failed to grade assignment"),
    })?;

    let updated = repositories::assignments::find_submission_detail(state.db(), &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch graded submission"))?
        .ok_or_else(|| ApiError::NotFound("Assignment submission not found".to_string()))?;

    let file_url = presigned_file_url(&state, &updated).await;
    Ok(Json(AssignmentSubmissionResponse::from_detail(updated, file_url)))
}

async fn suggest_for_assignment(
    Path(submission_id): Path<String>,
    Query(params): Query<SuggestQuery>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SuggestionResponse>, ApiError> {
    let detail = repositories::assignments::find_submission_detail(state.db(), &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch assignment submission"))?;

    let Some(detail) = detail else {
        return Err(ApiError::NotFound("Assignment submission not found".to_string()));
    };
    guards::require_review_access(&state, &user, &detail.course_id).await?;

    let outcome = grading_workflow::suggest_assignment(&state, &detail, params.regenerate)
        .await
        .map_err(|err| match err {
            SuggestError::Unavailable => {
                ApiError::ServiceUnavailable("AI grading is not configured".to_string())
            }
            SuggestError::InFlight => {
                ApiError::Conflict("A suggestion is already being generated".to_string())
            }
            SuggestError::Internal(e) => ApiError::internal(e, "Failed to generate AI suggestion"),
        })?;

    Ok(Json(SuggestionResponse {
        score: outcome.score,
        feedback: outcome.feedback,
        cached: outcome.cached,
    }))
}

async fn presigned_file_url(state: &AppState, detail: &AssignmentSubmissionDetail) -> Option<String> {
    let storage = state.storage()?;
    let key = detail.file_key.as_deref()?;
    match storage.presign_get(key, FILE_URL_TTL).await {
        Ok(url) => Some(url),
        Err(err) => {
            tracing::warn!(
                submission_id = %detail.id,
                error = %err,
                "Failed to presign submission file"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::db::types::{AssessmentKind, QuestionKind, UserRole};
    use crate::test_support::{self, TestContext};

    /// Seeds a course with one essay assessment and a submitted answer,
    /// returning the grading task id visible to the course instructor.
    async fn seed_essay_task(
        ctx: &TestContext,
        prefix: &str,
        school_id: Option<&str>,
    ) -> (String, String) {
        let db = ctx.state.db();
        let teacher = test_support::insert_user(
            db,
            &format!("{prefix}-teacher@example.com"),
            "Tess Teacher",
            UserRole::Teacher,
            school_id,
        )
        .await;
        let student = test_support::insert_user(
            db,
            &format!("{prefix}-student@example.com"),
            "Sam Student",
            UserRole::Student,
            school_id,
        )
        .await;
        let course = test_support::insert_course(db, "Biology 101", &teacher.id, school_id).await;
        test_support::enroll_student(db, &course.id, &student.id).await;

        let assessment =
            test_support::insert_assessment(db, &course.id, AssessmentKind::Quiz, 70.0).await;
        let bank = test_support::insert_question_bank(db, &course.id).await;
        let essay = test_support::insert_question(
            db,
            &bank,
            QuestionKind::Essay,
            "Explain photosynthesis.",
            10.0,
        )
        .await;
        test_support::attach_question(db, &assessment.id, &essay, 0).await;

        let token = test_support::bearer_token(&student.id, ctx.state.settings());
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/assessments/{}/submissions", assessment.id),
                Some(&token),
                Some(json!({
                    "answers": [{ "question_id": essay, "answer": "Plants convert light." }]
                })),
            ))
            .await
            .expect("submit assessment");
        assert_eq!(response.status(), StatusCode::CREATED);

        (teacher.id, course.id)
    }

    #[tokio::test]
    async fn instructor_completes_an_essay_grading_task() {
        let ctx = test_support::setup_test_context().await;
        let (teacher_id, _course_id) = seed_essay_task(&ctx, "bio", None).await;
        let token = test_support::bearer_token(&teacher_id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/grading/tasks",
                Some(&token),
                None,
            ))
            .await
            .expect("list tasks");
        let status = response.status();
        let listed = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {listed}");
        assert_eq!(listed["total_count"], 1);
        let task_id = listed["items"][0]["id"].as_str().expect("task id").to_string();
        assert_eq!(listed["items"][0]["status"], "pending");
        assert_eq!(listed["items"][0]["max_score"], 10.0);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/grading/tasks/{task_id}"),
                Some(&token),
                None,
            ))
            .await
            .expect("get task");
        let status = response.status();
        let detail = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {detail}");
        assert!(detail["ai_score"].is_null());
        assert_eq!(detail["question"], "Explain photosynthesis.");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::PATCH,
                &format!("/api/v1/grading/tasks/{task_id}"),
                Some(&token),
                Some(json!({ "score": 12.0 })),
            ))
            .await
            .expect("overscore task");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::PATCH,
                &format!("/api/v1/grading/tasks/{task_id}"),
                Some(&token),
                Some(json!({ "score": 8.0, "feedback": "Solid explanation." })),
            ))
            .await
            .expect("complete task");
        let status = response.status();
        let completed = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {completed}");
        assert_eq!(completed["task"]["status"], "completed");
        assert_eq!(completed["task"]["teacher_score"], 8.0);
        assert_eq!(completed["submission_score"], 8.0);
        assert_eq!(completed["submission_percentage"], 80.0);
        assert_eq!(completed["submission_passed"], true);
        assert_eq!(completed["pending_grading_tasks"], 0);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::PATCH,
                &format!("/api/v1/grading/tasks/{task_id}"),
                Some(&token),
                Some(json!({ "score": 5.0 })),
            ))
            .await
            .expect("re-complete task");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = ctx
            .app
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/grading/tasks?status=completed",
                Some(&token),
                None,
            ))
            .await
            .expect("list completed");
        let completed_list = test_support::read_json(response).await;
        assert_eq!(completed_list["total_count"], 1);
    }

    #[tokio::test]
    async fn reviewers_only_see_courses_they_grade() {
        let ctx = test_support::setup_test_context().await;
        let (_teacher_id, course_id) = seed_essay_task(&ctx, "bio", None).await;

        let db = ctx.state.db();
        let other = test_support::insert_user(
            db,
            "other-teacher@example.com",
            "Omar Other",
            UserRole::Teacher,
            None,
        )
        .await;
        let token = test_support::bearer_token(&other.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/grading/tasks",
                Some(&token),
                None,
            ))
            .await
            .expect("list tasks");
        let status = response.status();
        let listed = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {listed}");
        assert_eq!(listed["total_count"], 0);
        assert_eq!(listed["items"].as_array().expect("items").len(), 0);

        // Co-teaching without grading rights grants nothing.
        test_support::add_course_teacher(db, &course_id, &other.id, false).await;
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/grading/tasks",
                Some(&token),
                None,
            ))
            .await
            .expect("list tasks as non-grading co-teacher");
        let listed = test_support::read_json(response).await;
        assert_eq!(listed["total_count"], 0);

        let grader = test_support::insert_user(
            db,
            "co-grader@example.com",
            "Greta Grader",
            UserRole::Teacher,
            None,
        )
        .await;
        test_support::add_course_teacher(db, &course_id, &grader.id, true).await;
        let grader_token = test_support::bearer_token(&grader.id, ctx.state.settings());
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/grading/tasks",
                Some(&grader_token),
                None,
            ))
            .await
            .expect("list tasks as grading co-teacher");
        let status = response.status();
        let listed = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {listed}");
        assert_eq!(listed["total_count"], 1);

        let student = test_support::insert_user(
            db,
            "curious-student@example.com",
            "Cora Curious",
            UserRole::Student,
            None,
        )
        .await;
        let student_token = test_support::bearer_token(&student.id, ctx.state.settings());
        let response = ctx
            .app
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/grading/tasks",
                Some(&student_token),
                None,
            ))
            .await
            .expect("list tasks as student");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn school_admins_see_their_school_only() {
        let ctx = test_support::setup_test_context().await;
        seed_essay_task(&ctx, "north", Some("school-north")).await;
        seed_essay_task(&ctx, "south", Some("school-south")).await;

        let db = ctx.state.db();
        let admin = test_support::insert_user(
            db,
            "north-admin@example.com",
            "Nora Admin",
            UserRole::SchoolAdmin,
            Some("school-north"),
        )
        .await;
        let token = test_support::bearer_token(&admin.id, ctx.state.settings());

        let response = ctx
            .app
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/grading/tasks",
                Some(&token),
                None,
            ))
            .await
            .expect("list tasks");
        let status = response.status();
        let listed = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {listed}");
        assert_eq!(listed["total_count"], 1);
    }

    #[tokio::test]
    async fn assignment_submissions_are_graded_and_regradable() {
        let ctx = test_support::setup_test_context().await;
        let db = ctx.state.db();

        let teacher =
            test_support::insert_user(db, "teacher@example.com", "Tess Teacher", UserRole::Teacher, None)
                .await;
        let student =
            test_support::insert_user(db, "student@example.com", "Sam Student", UserRole::Student, None)
                .await;
        let course = test_support::insert_course(db, "Chemistry 201", &teacher.id, None).await;
        test_support::enroll_student(db, &course.id, &student.id).await;
        let assignment = test_support::insert_assignment(db, &course.id, "Lab report", 100.0).await;
        let submission_id =
            test_support::insert_assignment_submission(db, &assignment.id, &student.id, "report.pdf")
                .await;

        let token = test_support::bearer_token(&teacher.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/grading/assignments",
                Some(&token),
                None,
            ))
            .await
            .expect("list submissions");
        let status = response.status();
        let listed = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {listed}");
        assert_eq!(listed["total_count"], 1);
        assert_eq!(listed["items"][0]["status"], "submitted");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::PATCH,
                &format!("/api/v1/grading/assignments/{submission_id}"),
                Some(&token),
                Some(json!({ "score": 150.0 })),
            ))
            .await
            .expect("overscore submission");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::PATCH,
                &format!("/api/v1/grading/assignments/{submission_id}"),
                Some(&token),
                Some(json!({ "score": 85.0, "feedback": "Well structured." })),
            ))
            .await
            .expect("grade submission");
        let status = response.status();
        let graded = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {graded}");
        assert_eq!(graded["status"], "graded");
        assert_eq!(graded["score"], 85.0);
        assert_eq!(graded["feedback"], "Well structured.");

        let sampled: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM training_samples WHERE source_id = $1",
        )
        .bind(&submission_id)
        .fetch_one(db)
        .await
        .expect("count samples");
        assert_eq!(sampled, 1);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::PATCH,
                &format!("/api/v1/grading/assignments/{submission_id}"),
                Some(&token),
                Some(json!({ "score": 90.0 })),
            ))
            .await
            .expect("regrade submission");
        let status = response.status();
        let regraded = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {regraded}");
        assert_eq!(regraded["score"], 90.0);

        let response = ctx
            .app
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/grading/assignments/{submission_id}/suggestion"),
                Some(&token),
                None,
            ))
            .await
            .expect("request suggestion");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
