use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{self, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::repositories::grading_systems::{
    CreateGradeCriterion, CreateGradeWeight, CreateGradingSystem,
};
use crate::schemas::grading_system::{
    GradeCriterionCreate, GradeCriterionResponse, GradeCriterionUpdate, GradeWeightCreate,
    GradeWeightResponse, GradeWeightUpdate, GradingSystemCreate, GradingSystemResponse,
    GradingSystemUpdate, StudentGradeResponse,
};
use crate::services::grade_aggregator;

const WEIGHT_TOTAL_CAP: f64 = 100.0;

/// Routes hanging off a course id.
pub(crate) fn course_router() -> Router<AppState> {
    Router::new()
        .route(
            "/:course_id/grading-system",
            get(get_grading_system).post(create_grading_system).put(update_grading_system),
        )
        .route("/:course_id/grade-criteria", post(create_criterion))
        .route("/:course_id/grade-weights", get(list_weights).post(create_weight))
        .route("/:course_id/students/:student_id/grade", get(student_grade))
}

pub(crate) fn criterion_router() -> Router<AppState> {
    Router::new().route("/:criterion_id", put(update_criterion).delete(delete_criterion))
}

pub(crate) fn weight_router() -> Router<AppState> {
    Router::new().route("/:weight_id", put(update_weight).delete(delete_weight))
}

async fn get_grading_system(
    Path(course_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<GradingSystemResponse>, ApiError> {
    guards::require_course_view(&state, &user, &course_id).await?;

    let system = repositories::grading_systems::find_for_course(state.db(), &course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch grading system"))?;

    let Some(system) = system else {
        return Err(ApiError::NotFound("Grading system not found".to_string()));
    };

    let criteria = repositories::grading_systems::criteria_for_system(state.db(), &system.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch grade criteria"))?;
    let weights = repositories::grading_systems::weights_for_course(state.db(), &course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch grade weights"))?;

    Ok(Json(GradingSystemResponse::from_db(system, criteria, weights)))
}

async fn create_grading_system(
    Path(course_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<GradingSystemCreate>,
) -> Result<(StatusCode, Json<GradingSystemResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    guards::require_review_access(&state, &user, &course_id).await?;

    let existing = repositories::grading_systems::find_for_course(state.db(), &course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check existing grading system"))?;
    if existing.is_some() {
        return Err(ApiError::Conflict(
            "Grading system already exists for this course".to_string(),
        ));
    }

    let now = primitive_now_utc();
    let system = repositories::grading_systems::create(
        state.db(),
        CreateGradingSystem {
            id: &Uuid::new_v4().to_string(),
            course_id: &course_id,
            system_type: payload.system_type,
            passing_score: payload.passing_score,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create grading system"))?;

    tracing::info!(
        user_id = %user.id,
        course_id = %course_id,
        action = "grading_system_create",
        "Grading system created"
    );

    Ok((StatusCode::CREATED, Json(GradingSystemResponse::from_db(system, Vec::new(), Vec::new()))))
}

async fn update_grading_system(
    Path(course_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<GradingSystemUpdate>,
) -> Result<Json<GradingSystemResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    guards::require_review_access(&state, &user, &course_id).await?;

    let system = repositories::grading_systems::find_for_course(state.db(), &course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch grading system"))?;

    let Some(system) = system else {
        return Err(ApiError::NotFound("Grading system not found".to_string()));
    };

    let updated = repositories::grading_systems::update(
        state.db(),
        &system.id,
        payload.system_type,
        payload.passing_score,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update grading system"))?
    .ok_or_else(|| ApiError::NotFound("Grading system not found".to_string()))?;

    let criteria = repositories::grading_systems::criteria_for_system(state.db(), &updated.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch grade criteria"))?;
    let weights = repositories::grading_systems::weights_for_course(state.db(), &course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch grade weights"))?;

    tracing::info!(
        user_id = %user.id,
        course_id = %course_id,
        action = "grading_system_update",
        "Grading system updated"
    );

    Ok(Json(GradingSystemResponse::from_db(updated, criteria, weights)))
}

async fn create_criterion(
    Path(course_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<GradeCriterionCreate>,
) -> Result<(StatusCode, Json<GradeCriterionResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    guards::require_review_access(&state, &user, &course_id).await?;

    let system = repositories::grading_systems::find_for_course(state.db(), &course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch grading system"))?;

    let Some(system) = system else {
        return Err(ApiError::NotFound("Grading system not found".to_string()));
    };

    let now = primitive_now_utc();
    let criterion = repositories::grading_systems::create_criterion(
        state.db(),
        CreateGradeCriterion {
            id: &Uuid::new_v4().to_string(),
            grading_system_id: &system.id,
            grade: &payload.grade,
            min_score: payload.min_score,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create grade criterion"))?;

    tracing::info!(
        user_id = %user.id,
        course_id = %course_id,
        grade = %criterion.grade,
        action = "grade_criterion_create",
        "Grade criterion created"
    );

    Ok((StatusCode::CREATED, Json(GradeCriterionResponse::from_db(criterion))))
}

async fn update_criterion(
    Path(criterion_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<GradeCriterionUpdate>,
) -> Result<Json<GradeCriterionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let criterion = fetch_criterion(&state, &criterion_id).await?;
    let system = fetch_system(&state, &criterion.grading_system_id).await?;
    guards::require_review_access(&state, &user, &system.course_id).await?;

    let updated = repositories::grading_systems::update_criterion(
        state.db(),
        &criterion_id,
        &payload.grade,
        payload.min_score,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update grade criterion"))?
    .ok_or_else(|| ApiError::NotFound("Grade criterion not found".to_string()))?;

    tracing::info!(
        user_id = %user.id,
        criterion_id = %criterion_id,
        action = "grade_criterion_update",
        "Grade criterion updated"
    );

    Ok(Json(GradeCriterionResponse::from_db(updated)))
}

async fn delete_criterion(
    Path(criterion_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let criterion = fetch_criterion(&state, &criterion_id).await?;
    let system = fetch_system(&state, &criterion.grading_system_id).await?;
    guards::require_review_access(&state, &user, &system.course_id).await?;

    let deleted = repositories::grading_systems::delete_criterion(state.db(), &criterion_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete grade criterion"))?;
    if !deleted {
        return Err(ApiError::NotFound("Grade criterion not found".to_string()));
    }

    tracing::info!(
        user_id = %user.id,
        criterion_id = %criterion_id,
        action = "grade_criterion_delete",
        "Grade criterion deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn list_weights(
    Path(course_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<GradeWeightResponse>>, ApiError> {
    guards::require_course_view(&state, &user, &course_id).await?;

    let weights = repositories::grading_systems::weights_for_course(state.db(), &course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list grade weights"))?;

    Ok(Json(weights.into_iter().map(GradeWeightResponse::from_db).collect()))
}

async fn create_weight(
    Path(course_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<GradeWeightCreate>,
) -> Result<(StatusCode, Json<GradeWeightResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    guards::require_review_access(&state, &user, &course_id).await?;

    let exists = repositories::grading_systems::weight_exists_for_category(
        state.db(),
        &course_id,
        payload.category,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to check existing grade weight"))?;
    if exists {
        return Err(ApiError::Conflict(
            "Weight for this category already exists".to_string(),
        ));
    }

    let total = repositories::grading_systems::total_weight_excluding(state.db(), &course_id, None)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to sum grade weights"))?;
    if total + payload.weight > WEIGHT_TOTAL_CAP + 1e-9 {
        return Err(ApiError::BadRequest(
            "Total weight across categories cannot exceed 100".to_string(),
        ));
    }

    let now = primitive_now_utc();
    let weight = repositories::grading_systems::create_weight(
        state.db(),
        CreateGradeWeight {
            id: &Uuid::new_v4().to_string(),
            course_id: &course_id,
            category: payload.category,
            weight: payload.weight,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create grade weight"))?;

    tracing::info!(
        user_id = %user.id,
        course_id = %course_id,
        category = ?weight.category,
        weight = weight.weight,
        action = "grade_weight_create",
        "Grade weight created"
    );

    Ok((StatusCode::CREATED, Json(GradeWeightResponse::from_db(weight))))
}

async fn update_weight(
    Path(weight_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<GradeWeightUpdate>,
) -> Result<Json<GradeWeightResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let weight = repositories::grading_systems::find_weight(state.db(), &weight_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch grade weight"))?;

    let Some(weight) = weight else {
        return Err(ApiError::NotFound("Grade weight not found".to_string()));
    };
    guards::require_review_access(&state, &user, &weight.course_id).await?;

    let other_total = repositories::grading_systems::total_weight_excluding(
        state.db(),
        &weight.course_id,
        Some(&weight_id),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to sum grade weights"))?;
    if other_total + payload.weight > WEIGHT_TOTAL_CAP + 1e-9 {
        return Err(ApiError::BadRequest(
            "Total weight across categories cannot exceed 100".to_string(),
        ));
    }

    let updated = repositories::grading_systems::update_weight(
        state.db(),
        &weight_id,
        payload.weight,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update grade weight"))?
    .ok_or_else(|| ApiError::NotFound("Grade weight not found".to_string()))?;

    tracing::info!(
        user_id = %user.id,
        weight_id = %weight_id,
        weight = updated.weight,
        action = "grade_weight_update",
        "Grade weight updated"
    );

    Ok(Json(GradeWeightResponse::from_db(updated)))
}

async fn delete_weight(
    Path(weight_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let weight = repositories::grading_systems::find_weight(state.db(), &weight_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch grade weight"))?;

    let Some(weight) = weight else {
        return Err(ApiError::NotFound("Grade weight not found".to_string()));
    };
    guards::require_review_access(&state, &user, &weight.course_id).await?;

    let deleted = repositories::grading_systems::delete_weight(state.db(), &weight_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete grade weight"))?;
    if !deleted {
        return Err(ApiError::NotFound("Grade weight not found".to_string()));
    }

    tracing::info!(
        user_id = %user.id,
        weight_id = %weight_id,
        action = "grade_weight_delete",
        "Grade weight deleted"
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn student_grade(
    Path((course_id, student_id)): Path<(String, String)>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<StudentGradeResponse>, ApiError> {
    if user.id != student_id {
        guards::require_review_access(&state, &user, &course_id).await?;
    }

    let grade = grade_aggregator::student_course_grade(&state, &course_id, &student_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to calculate student grade"))?;

    let Some(grade) = grade else {
        return Err(ApiError::NotFound(
            "No grade is available for this student yet".to_string(),
        ));
    };

    Ok(Json(StudentGradeResponse {
        percentage: grade.percentage,
        grade: grade.grade,
        system_type: grade.system_type,
    }))
}

async fn fetch_criterion(
    state: &AppState,
    criterion_id: &str,
) -> Result<crate::db::models::GradeCriterion, ApiError> {
    let criterion = repositories::grading_systems::find_criterion(state.db(), criterion_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch grade criterion"))?;
    criterion.ok_or_else(|| ApiError::NotFound("Grade criterion not found".to_string()))
}

async fn fetch_system(
    state: &AppState,
    system_id: &str,
) -> Result<crate::db::models::GradingSystem, ApiError> {
    let system = repositories::grading_systems::find_by_id(state.db(), system_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch grading system"))?;
    system.ok_or_else(|| ApiError::NotFound("Grading system not found".to_string()))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::db::types::{AssessmentKind, QuestionKind, UserRole};
    use crate::test_support;

    #[tokio::test]
    async fn instructor_configures_a_grade_scale() {
        let ctx = test_support::setup_test_context().await;
        let db = ctx.state.db();

        let teacher =
            test_support::insert_user(db, "teacher@example.com", "Tess Teacher", UserRole::Teacher, None)
                .await;
        let course = test_support::insert_course(db, "History 101", &teacher.id, None).await;
        let token = test_support::bearer_token(&teacher.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/courses/{}/grading-system", course.id),
                Some(&token),
                Some(json!({ "system_type": "grade" })),
            ))
            .await
            .expect("create system");
        let status = response.status();
        let created = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::CREATED, "response: {created}");
        assert_eq!(created["system_type"], "grade");
        assert_eq!(created["criteria"].as_array().expect("criteria").len(), 0);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/courses/{}/grading-system", course.id),
                Some(&token),
                Some(json!({ "system_type": "grade" })),
            ))
            .await
            .expect("create duplicate system");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        for (grade, min_score) in [("B", 75.0), ("A", 90.0)] {
            let response = ctx
                .app
                .clone()
                .oneshot(test_support::json_request(
                    Method::POST,
                    &format!("/api/v1/courses/{}/grade-criteria", course.id),
                    Some(&token),
                    Some(json!({ "grade": grade, "min_score": min_score })),
                ))
                .await
                .expect("create criterion");
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/courses/{}/grading-system", course.id),
                Some(&token),
                None,
            ))
            .await
            .expect("get system");
        let status = response.status();
        let fetched = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {fetched}");
        let criteria = fetched["criteria"].as_array().expect("criteria");
        assert_eq!(criteria.len(), 2);
        assert_eq!(criteria[0]["grade"], "A");
        assert_eq!(criteria[1]["grade"], "B");
        let criterion_id = criteria[1]["id"].as_str().expect("criterion id").to_string();

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::PUT,
                &format!("/api/v1/grade-criteria/{criterion_id}"),
                Some(&token),
                Some(json!({ "grade": "B+", "min_score": 80.0 })),
            ))
            .await
            .expect("update criterion");
        let status = response.status();
        let updated = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {updated}");
        assert_eq!(updated["grade"], "B+");
        assert_eq!(updated["min_score"], 80.0);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::PUT,
                &format!("/api/v1/courses/{}/grading-system", course.id),
                Some(&token),
                Some(json!({ "system_type": "pass_fail", "passing_score": 60.0 })),
            ))
            .await
            .expect("update system");
        let status = response.status();
        let reworked = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {reworked}");
        assert_eq!(reworked["system_type"], "pass_fail");
        assert_eq!(reworked["passing_score"], 60.0);

        let response = ctx
            .app
            .oneshot(test_support::json_request(
                Method::DELETE,
                &format!("/api/v1/grade-criteria/{criterion_id}"),
                Some(&token),
                None,
            ))
            .await
            .expect("delete criterion");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn grade_weights_enforce_the_total_cap() {
        let ctx = test_support::setup_test_context().await;
        let db = ctx.state.db();

        let teacher =
            test_support::insert_user(db, "teacher@example.com", "Tess Teacher", UserRole::Teacher, None)
                .await;
        let course = test_support::insert_course(db, "History 101", &teacher.id, None).await;
        let token = test_support::bearer_token(&teacher.id, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/courses/{}/grade-weights", course.id),
                Some(&token),
                Some(json!({ "category": "quiz", "weight": 40.0 })),
            ))
            .await
            .expect("create quiz weight");
        let status = response.status();
        let quiz_weight = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::CREATED, "response: {quiz_weight}");
        let quiz_weight_id = quiz_weight["id"].as_str().expect("weight id").to_string();

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/courses/{}/grade-weights", course.id),
                Some(&token),
                Some(json!({ "category": "quiz", "weight": 10.0 })),
            ))
            .await
            .expect("duplicate category");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/courses/{}/grade-weights", course.id),
                Some(&token),
                Some(json!({ "category": "exam", "weight": 70.0 })),
            ))
            .await
            .expect("overweight category");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/courses/{}/grade-weights", course.id),
                Some(&token),
                Some(json!({ "category": "assignment", "weight": 60.0 })),
            ))
            .await
            .expect("create assignment weight");
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::PUT,
                &format!("/api/v1/grade-weights/{quiz_weight_id}"),
                Some(&token),
                Some(json!({ "weight": 50.0 })),
            ))
            .await
            .expect("overweight update");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::PUT,
                &format!("/api/v1/grade-weights/{quiz_weight_id}"),
                Some(&token),
                Some(json!({ "weight": 30.0 })),
            ))
            .await
            .expect("update weight");
        let status = response.status();
        let updated = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {updated}");
        assert_eq!(updated["weight"], 30.0);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/courses/{}/grade-weights", course.id),
                Some(&token),
                None,
            ))
            .await
            .expect("list weights");
        let listed = test_support::read_json(response).await;
        assert_eq!(listed.as_array().expect("weights").len(), 2);

        let response = ctx
            .app
            .oneshot(test_support::json_request(
                Method::DELETE,
                &format!("/api/v1/grade-weights/{quiz_weight_id}"),
                Some(&token),
                None,
            ))
            .await
            .expect("delete weight");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn student_grade_blends_weighted_categories() {
        let ctx = test_support::setup_test_context().await;
        let db = ctx.state.db();

        let teacher =
            test_support::insert_user(db, "teacher@example.com", "Tess Teacher", UserRole::Teacher, None)
                .await;
        let student =
            test_support::insert_user(db, "student@example.com", "Sam Student", UserRole::Student, None)
                .await;
        let course = test_support::insert_course(db, "Physics 301", &teacher.id, None).await;
        test_support::enroll_student(db, &course.id, &student.id).await;

        let teacher_token = test_support::bearer_token(&teacher.id, ctx.state.settings());
        let student_token = test_support::bearer_token(&student.id, ctx.state.settings());
        let grade_url =
            format!("/api/v1/courses/{}/students/{}/grade", course.id, student.id);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &grade_url,
                Some(&teacher_token),
                None,
            ))
            .await
            .expect("grade without system");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/courses/{}/grading-system", course.id),
                Some(&teacher_token),
                Some(json!({ "system_type": "pass_fail", "passing_score": 70.0 })),
            ))
            .await
            .expect("create system");
        assert_eq!(response.status(), StatusCode::CREATED);

        for (category, weight) in [("quiz", 40.0), ("assignment", 60.0)] {
            let response = ctx
                .app
                .clone()
                .oneshot(test_support::json_request(
                    Method::POST,
                    &format!("/api/v1/courses/{}/grade-weights", course.id),
                    Some(&teacher_token),
                    Some(json!({ "category": category, "weight": weight })),
                ))
                .await
                .expect("create weight");
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let assessment =
            test_support::insert_assessment(db, &course.id, AssessmentKind::Quiz, 70.0).await;
        let bank = test_support::insert_question_bank(db, &course.id).await;
        let question = test_support::insert_question(
            db,
            &bank,
            QuestionKind::MultipleChoice,
            "What is the speed of light?",
            10.0,
        )
        .await;
        test_support::insert_option(db, &question, "299792458 m/s", true, 0).await;
        test_support::attach_question(db, &assessment.id, &question, 0).await;

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/assessments/{}/submissions", assessment.id),
                Some(&student_token),
                Some(json!({
                    "answers": [{ "question_id": question, "answer": "299792458 m/s" }]
                })),
            ))
            .await
            .expect("submit quiz");
        assert_eq!(response.status(), StatusCode::CREATED);

        // Only the quiz category has finalized work, so it carries full weight.
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &grade_url,
                Some(&teacher_token),
                None,
            ))
            .await
            .expect("grade with quiz only");
        let status = response.status();
        let quiz_only = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {quiz_only}");
        assert_eq!(quiz_only["percentage"], 100.0);
        assert_eq!(quiz_only["grade"], "PASS");

        let assignment = test_support::insert_assignment(db, &course.id, "Lab report", 100.0).await;
        let submission_id =
            test_support::insert_assignment_submission(db, &assignment.id, &student.id, "lab.pdf")
                .await;
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::PATCH,
                &format!("/api/v1/grading/assignments/{submission_id}"),
                Some(&teacher_token),
                Some(json!({ "score": 90.0 })),
            ))
            .await
            .expect("grade assignment");
        assert_eq!(response.status(), StatusCode::OK);

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &grade_url,
                Some(&teacher_token),
                None,
            ))
            .await
            .expect("weighted grade");
        let status = response.status();
        let weighted = test_support::read_json(response).await;
        assert_eq!(status, StatusCode::OK, "response: {weighted}");
        assert_eq!(weighted["percentage"], 94.0);
        assert_eq!(weighted["grade"], "PASS");
        assert_eq!(weighted["system_type"], "pass_fail");

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &grade_url,
                Some(&student_token),
                None,
            ))
            .await
            .expect("own grade");
        assert_eq!(response.status(), StatusCode::OK);

        let classmate = test_support::insert_user(
            db,
            "classmate@example.com",
            "Cleo Classmate",
            UserRole::Student,
            None,
        )
        .await;
        let classmate_token = test_support::bearer_token(&classmate.id, ctx.state.settings());
        let response = ctx
            .app
            .oneshot(test_support::json_request(
                Method::GET,
                &grade_url,
                Some(&classmate_token),
                None,
            ))
            .await
            .expect("classmate grade");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
