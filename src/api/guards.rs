use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::db::models::User;
use crate::db::types::UserRole;
use crate::repositories;
use crate::repositories::ReviewScope;

pub(crate) struct CurrentUser(pub(crate) User);
pub(crate) struct CurrentAdmin(pub(crate) User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        let user = repositories::users::find_by_id(app_state.db(), &claims.sub)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load user"))?;

        let Some(user) = user else {
            return Err(ApiError::Unauthorized("User not found"));
        };

        if !user.is_active {
            return Err(ApiError::Unauthorized("Invalid authentication credentials"));
        }

        Ok(CurrentUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if user.role.is_admin() {
            Ok(CurrentAdmin(user))
        } else {
            Err(ApiError::Forbidden("Admin access required"))
        }
    }
}

/// The slice of grading work a reviewer may see: everything for a platform
/// admin, one school for a school admin, granted courses for a teacher.
pub(crate) async fn review_scope(state: &AppState, user: &User) -> Result<ReviewScope, ApiError> {
    match user.role {
        UserRole::SuperAdmin => Ok(ReviewScope::All),
        UserRole::SchoolAdmin => {
            let school_id = user
                .school_id
                .clone()
                .ok_or(ApiError::Forbidden("School admin account has no school"))?;
            Ok(ReviewScope::School(school_id))
        }
        UserRole::Teacher => {
            let course_ids = repositories::courses::grading_course_ids(state.db(), &user.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load grading courses"))?;
            Ok(ReviewScope::Courses(course_ids))
        }
        UserRole::Student => Err(ApiError::Forbidden("Grading access required")),
    }
}

/// Grading rights on one course: platform admins everywhere, school admins
/// within their school, teachers where the course grants them grading.
pub(crate) async fn require_review_access(
    state: &AppState,
    user: &User,
    course_id: &str,
) -> Result<(), ApiError> {
    let course = repositories::courses::find_by_id(state.db(), course_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch course"))?;

    let Some(course) = course else {
        return Err(ApiError::NotFound("Course not found".to_string()));
    };

    let allowed = match user.role {
        UserRole::SuperAdmin => true,
        UserRole::SchoolAdmin => {
            user.school_id.is_some() && user.school_id == course.school_id
        }
        UserRole::Teacher => {
            repositories::courses::has_grading_rights(state.db(), course_id, &user.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to check grading rights"))?
        }
        UserRole::Student => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Not enough permissions for this course"))
    }
}

/// Read access to course grading configuration: reviewers plus enrolled
/// students.
pub(crate) async fn require_course_view(
    state: &AppState,
    user: &User,
    course_id: &str,
) -> Result<(), ApiError> {
    if user.role == UserRole::Student {
        let enrolled = repositories::courses::is_enrolled(state.db(), course_id, &user.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to check enrollment"))?;
        if enrolled {
            return Ok(());
        }
        return Err(ApiError::Forbidden("Not enough permissions for this course"));
    }
    require_review_access(state, user, course_id).await
}

/// Resolves the school scope an admin may operate training under. Platform
/// admins pass any scope through; school admins are pinned to their own
/// school and an explicit mismatch is rejected rather than silently widened.
pub(crate) fn training_scope(
    user: &User,
    requested: Option<String>,
) -> Result<Option<String>, ApiError> {
    match user.role {
        UserRole::SuperAdmin => Ok(requested),
        UserRole::SchoolAdmin => {
            let own = user
                .school_id
                .clone()
                .ok_or(ApiError::Forbidden("School admin account has no school"))?;
            match requested {
                Some(school) if school != own => {
                    Err(ApiError::Forbidden("Cannot manage training for another school"))
                }
                _ => Ok(Some(own)),
            }
        }
        _ => Err(ApiError::Forbidden("Admin access required")),
    }
}
