use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{GradeCriterion, GradeWeight, GradingSystem};
use crate::db::types::{GradeCategory, GradingSystemType};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradingSystemCreate {
    #[serde(alias = "systemType")]
    pub(crate) system_type: GradingSystemType,
    #[serde(default)]
    #[serde(alias = "passingScore")]
    #[validate(range(min = 0.0, max = 100.0, message = "passing_score must be within 0..=100"))]
    pub(crate) passing_score: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradingSystemUpdate {
    #[serde(alias = "systemType")]
    pub(crate) system_type: GradingSystemType,
    #[serde(default)]
    #[serde(alias = "passingScore")]
    #[validate(range(min = 0.0, max = 100.0, message = "passing_score must be within 0..=100"))]
    pub(crate) passing_score: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradeCriterionCreate {
    #[validate(length(min = 1, message = "grade must not be empty"))]
    pub(crate) grade: String,
    #[serde(alias = "minScore")]
    #[validate(range(min = 0.0, max = 100.0, message = "min_score must be within 0..=100"))]
    pub(crate) min_score: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradeCriterionUpdate {
    #[validate(length(min = 1, message = "grade must not be empty"))]
    pub(crate) grade: String,
    #[serde(alias = "minScore")]
    #[validate(range(min = 0.0, max = 100.0, message = "min_score must be within 0..=100"))]
    pub(crate) min_score: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradeWeightCreate {
    pub(crate) category: GradeCategory,
    #[validate(range(exclusive_min = 0.0, max = 100.0, message = "weight must be within 0..=100"))]
    pub(crate) weight: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradeWeightUpdate {
    #[validate(range(exclusive_min = 0.0, max = 100.0, message = "weight must be within 0..=100"))]
    pub(crate) weight: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct GradeCriterionResponse {
    pub(crate) id: String,
    pub(crate) grading_system_id: String,
    pub(crate) grade: String,
    pub(crate) min_score: f64,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl GradeCriterionResponse {
    pub(crate) fn from_db(criterion: GradeCriterion) -> Self {
        Self {
            id: criterion.id,
            grading_system_id: criterion.grading_system_id,
            grade: criterion.grade,
            min_score: criterion.min_score,
            created_at: format_primitive(criterion.created_at),
            updated_at: format_primitive(criterion.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GradingSystemResponse {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) system_type: GradingSystemType,
    pub(crate) passing_score: Option<f64>,
    pub(crate) criteria: Vec<GradeCriterionResponse>,
    pub(crate) weights: Vec<GradeWeightResponse>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl GradingSystemResponse {
    pub(crate) fn from_db(
        system: GradingSystem,
        criteria: Vec<GradeCriterion>,
        weights: Vec<GradeWeight>,
    ) -> Self {
        Self {
            id: system.id,
            course_id: system.course_id,
            system_type: system.system_type,
            passing_score: system.passing_score,
            criteria: criteria
                .into_iter()
                .map(GradeCriterionResponse::from_db)
                .collect(),
            weights: weights.into_iter().map(GradeWeightResponse::from_db).collect(),
            created_at: format_primitive(system.created_at),
            updated_at: format_primitive(system.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GradeWeightResponse {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) category: GradeCategory,
    pub(crate) weight: f64,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl GradeWeightResponse {
    pub(crate) fn from_db(weight: GradeWeight) -> Self {
        Self {
            id: weight.id,
            course_id: weight.course_id,
            category: weight.category,
            weight: weight.weight,
            created_at: format_primitive(weight.created_at),
            updated_at: format_primitive(weight.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentGradeResponse {
    pub(crate) percentage: f64,
    pub(crate) grade: String,
    pub(crate) system_type: GradingSystemType,
}
