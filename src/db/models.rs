use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{
    AssessmentKind, GradeCategory, GradingSystemType, QuestionKind, TrainingRunStatus,
    TrainingSource, UserRole,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) school_id: Option<String>,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Course {
    pub(crate) id: String,
    pub(crate) school_id: Option<String>,
    pub(crate) instructor_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Assessment {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) kind: AssessmentKind,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) start_date: PrimitiveDateTime,
    pub(crate) end_date: PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
    pub(crate) passing_score: f64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// An assessment question joined with its position in the assessment.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AssessmentQuestion {
    pub(crate) question_id: String,
    pub(crate) order_index: i32,
    pub(crate) kind: QuestionKind,
    pub(crate) text: String,
    pub(crate) points: f64,
    pub(crate) explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionOption {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) text: String,
    pub(crate) is_correct: bool,
    pub(crate) order_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) assessment_id: String,
    pub(crate) student_id: String,
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) percentage: f64,
    pub(crate) passed: Option<bool>,
    pub(crate) time_spent_minutes: Option<i32>,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct SubmissionAnswer {
    pub(crate) id: String,
    pub(crate) submission_id: String,
    pub(crate) question_id: String,
    pub(crate) answer: String,
    pub(crate) is_correct: Option<bool>,
    pub(crate) points: Option<f64>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Assignment {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) max_score: f64,
    pub(crate) due_date: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct GradingSystem {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) system_type: GradingSystemType,
    pub(crate) passing_score: Option<f64>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct GradeCriterion {
    pub(crate) id: String,
    pub(crate) grading_system_id: String,
    pub(crate) grade: String,
    pub(crate) min_score: f64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct GradeWeight {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) category: GradeCategory,
    pub(crate) weight: f64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct TrainingSample {
    pub(crate) id: String,
    pub(crate) question: String,
    pub(crate) answer: String,
    pub(crate) ai_score: Option<f64>,
    pub(crate) ai_feedback: Option<String>,
    pub(crate) teacher_score: Option<f64>,
    pub(crate) teacher_feedback: Option<String>,
    pub(crate) max_score: f64,
    pub(crate) source_type: TrainingSource,
    pub(crate) source_id: String,
    pub(crate) school_id: Option<String>,
    pub(crate) used_for_training: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct TrainingSettings {
    pub(crate) id: String,
    pub(crate) school_id: Option<String>,
    pub(crate) ai_weight: f64,
    pub(crate) teacher_weight: f64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct TrainingRun {
    pub(crate) id: String,
    pub(crate) school_id: Option<String>,
    pub(crate) status: TrainingRunStatus,
    pub(crate) samples: i32,
    pub(crate) accuracy: Option<f64>,
    pub(crate) mse: Option<f64>,
    pub(crate) mae: Option<f64>,
    pub(crate) ai_weight: f64,
    pub(crate) teacher_weight: f64,
    pub(crate) error_message: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
}
