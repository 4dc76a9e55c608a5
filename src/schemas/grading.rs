use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::types::{AssignmentSubmissionStatus, GradingTaskStatus};
use crate::repositories::assignments::AssignmentSubmissionDetail;
use crate::repositories::grading_tasks::GradingTaskDetail;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CompleteGradingTaskRequest {
    #[validate(range(min = 0.0, message = "score must be non-negative"))]
    pub(crate) score: f64,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradeAssignmentRequest {
    #[validate(range(min = 0.0, message = "score must be non-negative"))]
    pub(crate) score: f64,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GradingTaskResponse {
    pub(crate) id: String,
    pub(crate) submission_id: String,
    pub(crate) question_id: String,
    pub(crate) question: String,
    pub(crate) max_score: f64,
    pub(crate) answer: String,
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) assessment_id: String,
    pub(crate) assessment_title: String,
    pub(crate) course_id: String,
    pub(crate) course_title: String,
    pub(crate) ai_score: Option<f64>,
    pub(crate) ai_feedback: Option<String>,
    pub(crate) teacher_score: Option<f64>,
    pub(crate) teacher_feedback: Option<String>,
    pub(crate) graded_by: Option<String>,
    pub(crate) status: GradingTaskStatus,
    pub(crate) created_at: String,
}

impl GradingTaskResponse {
    pub(crate) fn from_detail(detail: GradingTaskDetail) -> Self {
        Self {
            id: detail.id,
            submission_id: detail.submission_id,
            question_id: detail.question_id,
            question: detail.question_text,
            max_score: detail.question_points,
            answer: detail.answer,
            student_id: detail.student_id,
            student_name: detail.student_name,
            assessment_id: detail.assessment_id,
            assessment_title: detail.assessment_title,
            course_id: detail.course_id,
            course_title: detail.course_title,
            ai_score: detail.ai_score,
            ai_feedback: detail.ai_feedback,
            teacher_score: detail.teacher_score,
            teacher_feedback: detail.teacher_feedback,
            graded_by: detail.graded_by,
            status: detail.status,
            created_at: format_primitive(detail.created_at),
        }
    }
}

/// Returned after a grading task is completed: the updated task plus the
/// recomputed submission totals, so the reviewer sees the effect right away.
#[derive(Debug, Serialize)]
pub(crate) struct CompletedTaskResponse {
    pub(crate) task: GradingTaskResponse,
    pub(crate) submission_score: f64,
    pub(crate) submission_percentage: f64,
    pub(crate) submission_passed: Option<bool>,
    pub(crate) pending_grading_tasks: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentSubmissionResponse {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) assignment_title: String,
    pub(crate) max_score: f64,
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) course_id: String,
    pub(crate) course_title: String,
    pub(crate) file_name: String,
    pub(crate) file_size: i64,
    pub(crate) file_url: Option<String>,
    pub(crate) ai_score: Option<f64>,
    pub(crate) ai_feedback: Option<String>,
    pub(crate) score: Option<f64>,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_by: Option<String>,
    pub(crate) graded_at: Option<String>,
    pub(crate) status: AssignmentSubmissionStatus,
    pub(crate) submitted_at: String,
}

impl AssignmentSubmissionResponse {
    pub(crate) fn from_detail(detail: AssignmentSubmissionDetail, file_url: Option<String>) -> Self {
        Self {
            id: detail.id,
            assignment_id: detail.assignment_id,
            assignment_title: detail.assignment_title,
            max_score: detail.max_score,
            student_id: detail.student_id,
            student_name: detail.student_name,
            course_id: detail.course_id,
            course_title: detail.course_title,
            file_name: detail.file_name,
            file_size: detail.file_size,
            file_url,
            ai_score: detail.ai_score,
            ai_feedback: detail.ai_feedback,
            score: detail.score,
            feedback: detail.feedback,
            graded_by: detail.graded_by,
            graded_at: detail.graded_at.map(format_primitive),
            status: detail.status,
            submitted_at: format_primitive(detail.submitted_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SuggestionResponse {
    pub(crate) score: f64,
    pub(crate) feedback: String,
    pub(crate) cached: bool,
}
