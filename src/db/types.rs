use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "userrole", rename_all = "snake_case")]
pub(crate) enum UserRole {
    Student,
    Teacher,
    SchoolAdmin,
    SuperAdmin,
}

impl UserRole {
    pub(crate) fn is_admin(self) -> bool {
        matches!(self, UserRole::SchoolAdmin | UserRole::SuperAdmin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "assessmentkind", rename_all = "lowercase")]
pub(crate) enum AssessmentKind {
    Quiz,
    Midterm,
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questionkind", rename_all = "snake_case")]
pub(crate) enum QuestionKind {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Essay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "gradingtaskstatus", rename_all = "lowercase")]
pub(crate) enum GradingTaskStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "assignmentsubmissionstatus", rename_all = "lowercase")]
pub(crate) enum AssignmentSubmissionStatus {
    Submitted,
    Graded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "gradingsystemtype", rename_all = "snake_case")]
pub(crate) enum GradingSystemType {
    PassFail,
    Grade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "gradecategory", rename_all = "lowercase")]
pub(crate) enum GradeCategory {
    Quiz,
    Assignment,
    Exam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "trainingsource", rename_all = "lowercase")]
pub(crate) enum TrainingSource {
    Exam,
    Assignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "trainingrunstatus", rename_all = "lowercase")]
pub(crate) enum TrainingRunStatus {
    Completed,
    Failed,
}
