use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::assessment::{SubmissionResponse, SubmitAssessmentRequest};
use crate::services::submission_intake::{self, SubmitError};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:assessment_id/submissions", post(submit_assessment))
        .route("/:assessment_id/submissions/me", get(my_submission))
}

async fn submit_assessment(
    Path(assessment_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SubmitAssessmentRequest>,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    if user.role != UserRole::Student {
        return Err(ApiError::Forbidden("Only students can submit assessments"));
    }
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let outcome = submission_intake::submit_assessment(
        &state,
        &assessment_id,
        &user.id,
        &payload.answers,
        payload.time_spent_minutes,
    )
    .await;

    let outcome = match outcome {
        Ok(outcome) => {
            metrics::counter!("assessment_submissions_total", "result" => "accepted").increment(1);
            outcome
        }
        Err(err) => {
            metrics::counter!("assessment_submissions_total", "result" => "rejected").increment(1);
            return Err(match err {
                SubmitError::AssessmentNotFound => {
                    ApiError::NotFound("Assessment not found".to_string())
                }
                SubmitError::NotEnrolled => {
                    ApiError::Forbidden("Student is not enrolled in this course")
                }
                SubmitError::OutsideWindow => {
                    ApiError::BadRequest("Assessment window is not open".to_string())
                }
                SubmitError::AlreadySubmitted => {
                    ApiError::Conflict("Assessment was already submitted".to_string())
                }
                SubmitError::Internal(e) => ApiError::internal(e, "Failed to submit assessment"),
            });
        }
    };

    let answers =
        repositories::submissions::answers_for_submission(state.db(), &outcome.submission.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load submission answers"))?;

    Ok((
        StatusCode::CREATED,
        Json(SubmissionResponse::from_db(outcome.submission, answers, outcome.pending_tasks)),
    ))
}

async fn my_submission(
    Path(assessment_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission =
        repositories::submissions::find_for_student(state.db(), &assessment_id, &user.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch submission"))?;

    let Some(submission) = submission else {
        return Err(ApiError::NotFound("Submission not found".to_string()));
    };

    let answers = repositories::submissions::answers_for_submission(state.db(), &submission.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load submission answers"))?;
    let pending =
        repositories::grading_tasks::pending_count_for_submission(state.db(), &submission.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count pending grading tasks"))?;

    Ok(Json(SubmissionResponse::from_db(submission, answers, pending)))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::core::time::primitive_now_utc;
    use crate::db::types::{AssessmentKind, QuestionKind, UserRole};
    use crate::test_support;

    #[tokio::test]
    async fn student_submits_and_objective_answers_autograde() {
        let ctx = test_support::setup_test_context().await;
        let db = ctx.state.db();

        let teacher =
            test_support::insert_user(db, "teacher@example.com", "Tess Teacher", UserRole::Teacher, None)
                .await;
        let student =
            test_support::insert_user(db, "student@example.com", "Sam Student", UserRole::Student, None)
                .await;
        let course = test_support::insert_course(db, "Biology 101", &teacher.id, None).await;
        test_support::enroll_student(db, &course.id, &student.id).await;

        let assessment =
            test_support::insert_assessment(db, &course.id, AssessmentKind::Quiz, 70.0).await;
        let bank = test_support::insert_question_bank(db, &course.id).await;
        let choice = test_support::insert_question(
            db,
            &bank,
            QuestionKind::MultipleChoice,
            "What is the capital of France?",
            10.0,
        )
        .await;
        test_support::insert_option(db, &choice, "Paris", true, 0).await;
        test_support::insert_option(db, &choice, "Lyon", false, 1).await;
        let essay = test_support::insert_question(
            db,
            &bank,
            QuestionKind::Essay,
            "Explain photosynthesis.",
            10.0,
        )
        .await;
        test_support::attach_question(db, &assessment.id, &choice, 0).await;
        test_support::attach_question(db, &assessment.id, &essay, 1).await;

        let token = test_support::bearer_token(&student.id, ctx.state.settings());
        let payload = json!({
            "answers": [
                { "question_id": choice, "answer": "Paris" },
                { "question_id": essay, "answer": "Plants convert light into energy." }
            ],
            "time_spent_minutes": 12
        });

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/assessments/{}/submissions", assessment.id),
                Some(&token),
                Some(payload),
            ))
            .await
            .expect("submit assessment");

        let status = response.status();
        let body = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::CREATED, "response: {body}");
        assert_eq!(body["score"], 10.0);
        assert_eq!(body["max_score"], 20.0);
        assert_eq!(body["percentage"], 50.0);
        assert!(body["passed"].is_null());
        assert_eq!(body["pending_grading_tasks"], 1);
        assert_eq!(body["answers"].as_array().expect("answers").len(), 2);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/assessments/{}/submissions/me", assessment.id),
                Some(&token),
                None,
            ))
            .await
            .expect("fetch own submission");

        let status = response.status();
        let fetched = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {fetched}");
        assert_eq!(fetched["id"], body["id"]);
        assert_eq!(fetched["pending_grading_tasks"], 1);

        let response = ctx
            .app
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/assessments/{}/submissions", assessment.id),
                Some(&token),
                Some(json!({ "answers": [] })),
            ))
            .await
            .expect("resubmit assessment");

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unenrolled_student_cannot_submit() {
        let ctx = test_support::setup_test_context().await;
        let db = ctx.state.db();

        let teacher =
            test_support::insert_user(db, "teacher@example.com", "Tess Teacher", UserRole::Teacher, None)
                .await;
        let outsider =
            test_support::insert_user(db, "other@example.com", "Olly Outsider", UserRole::Student, None)
                .await;
        let course = test_support::insert_course(db, "Biology 101", &teacher.id, None).await;
        let assessment =
            test_support::insert_assessment(db, &course.id, AssessmentKind::Quiz, 70.0).await;

        let token = test_support::bearer_token(&outsider.id, ctx.state.settings());
        let response = ctx
            .app
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/assessments/{}/submissions", assessment.id),
                Some(&token),
                Some(json!({ "answers": [] })),
            ))
            .await
            .expect("submit assessment");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn submission_outside_the_window_is_rejected() {
        let ctx = test_support::setup_test_context().await;
        let db = ctx.state.db();

        let teacher =
            test_support::insert_user(db, "teacher@example.com", "Tess Teacher", UserRole::Teacher, None)
                .await;
        let student =
            test_support::insert_user(db, "student@example.com", "Sam Student", UserRole::Student, None)
                .await;
        let course = test_support::insert_course(db, "Biology 101", &teacher.id, None).await;
        test_support::enroll_student(db, &course.id, &student.id).await;

        let now = primitive_now_utc();
        let assessment = test_support::insert_assessment_with_window(
            db,
            &course.id,
            AssessmentKind::Quiz,
            70.0,
            now - time::Duration::hours(4),
            now - time::Duration::hours(2),
        )
        .await;

        let token = test_support::bearer_token(&student.id, ctx.state.settings());
        let response = ctx
            .app
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/assessments/{}/submissions", assessment.id),
                Some(&token),
                Some(json!({ "answers": [] })),
            ))
            .await
            .expect("submit assessment");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn teachers_cannot_submit_assessments() {
        let ctx = test_support::setup_test_context().await;
        let db = ctx.state.db();

        let teacher =
            test_support::insert_user(db, "teacher@example.com", "Tess Teacher", UserRole::Teacher, None)
                .await;
        let course = test_support::insert_course(db, "Biology 101", &teacher.id, None).await;
        let assessment =
            test_support::insert_assessment(db, &course.id, AssessmentKind::Quiz, 70.0).await;

        let token = test_support::bearer_token(&teacher.id, ctx.state.settings());
        let response = ctx
            .app
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/assessments/{}/submissions", assessment.id),
                Some(&token),
                Some(json!({ "answers": [] })),
            ))
            .await
            .expect("submit assessment");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_submission_returns_not_found() {
        let ctx = test_support::setup_test_context().await;
        let db = ctx.state.db();

        let teacher =
            test_support::insert_user(db, "teacher@example.com", "Tess Teacher", UserRole::Teacher, None)
                .await;
        let student =
            test_support::insert_user(db, "student@example.com", "Sam Student", UserRole::Student, None)
                .await;
        let course = test_support::insert_course(db, "Biology 101", &teacher.id, None).await;
        test_support::enroll_student(db, &course.id, &student.id).await;
        let assessment =
            test_support::insert_assessment(db, &course.id, AssessmentKind::Quiz, 70.0).await;

        let token = test_support::bearer_token(&student.id, ctx.state.settings());
        let response = ctx
            .app
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/assessments/{}/submissions/me", assessment.id),
                Some(&token),
                None,
            ))
            .await
            .expect("fetch own submission");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
