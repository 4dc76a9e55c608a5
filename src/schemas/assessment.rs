use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Submission, SubmissionAnswer};

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SubmittedAnswer {
    #[serde(alias = "questionId")]
    pub(crate) question_id: String,
    #[serde(default)]
    pub(crate) answer: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmitAssessmentRequest {
    #[serde(default)]
    pub(crate) answers: Vec<SubmittedAnswer>,
    #[serde(default)]
    #[serde(alias = "timeSpent")]
    #[validate(range(min = 0, message = "time_spent_minutes must be non-negative"))]
    pub(crate) time_spent_minutes: Option<i32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionAnswerResponse {
    pub(crate) question_id: String,
    pub(crate) answer: String,
    pub(crate) is_correct: Option<bool>,
    pub(crate) points: Option<f64>,
}

impl SubmissionAnswerResponse {
    pub(crate) fn from_db(answer: SubmissionAnswer) -> Self {
        Self {
            question_id: answer.question_id,
            answer: answer.answer,
            is_correct: answer.is_correct,
            points: answer.points,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) assessment_id: String,
    pub(crate) student_id: String,
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) percentage: f64,
    pub(crate) passed: Option<bool>,
    pub(crate) pending_grading_tasks: i64,
    pub(crate) time_spent_minutes: Option<i32>,
    pub(crate) submitted_at: String,
    pub(crate) answers: Vec<SubmissionAnswerResponse>,
}

impl SubmissionResponse {
    pub(crate) fn from_db(
        submission: Submission,
        answers: Vec<SubmissionAnswer>,
        pending_grading_tasks: i64,
    ) -> Self {
        Self {
            id: submission.id,
            assessment_id: submission.assessment_id,
            student_id: submission.student_id,
            score: submission.score,
            max_score: submission.max_score,
            percentage: submission.percentage,
            passed: submission.passed,
            pending_grading_tasks,
            time_spent_minutes: submission.time_spent_minutes,
            submitted_at: format_primitive(submission.submitted_at),
            answers: answers
                .into_iter()
                .map(SubmissionAnswerResponse::from_db)
                .collect(),
        }
    }
}
