use std::collections::{HashMap, HashSet};

use anyhow::Context;
use thiserror::Error;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{AssessmentQuestion, QuestionOption, Submission};
use crate::db::types::QuestionKind;
use crate::repositories;
use crate::schemas::assessment::SubmittedAnswer;
use crate::services::answer_evaluator::{self, AnswerVerdict};

#[derive(Debug, Error)]
pub(crate) enum SubmitError {
    #[error("assessment not found")]
    AssessmentNotFound,
    #[error("student is not enrolled in this course")]
    NotEnrolled,
    #[error("assessment window is not open")]
    OutsideWindow,
    #[error("assessment was already submitted")]
    AlreadySubmitted,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug)]
pub(crate) struct SubmissionOutcome {
    pub(crate) submission: Submission,
    pub(crate) pending_tasks: i64,
}

#[derive(Debug)]
pub(crate) struct PlannedAnswer {
    pub(crate) question_id: String,
    pub(crate) answer: String,
    pub(crate) verdict: AnswerVerdict,
    pub(crate) is_essay: bool,
}

#[derive(Debug)]
pub(crate) struct SubmissionPlan {
    pub(crate) answers: Vec<PlannedAnswer>,
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) percentage: f64,
    pub(crate) passed: Option<bool>,
}

/// Scores the submitted answers against the assessment's questions.
///
/// Answers referencing questions outside the assessment are dropped, as is any
/// repeated answer to the same question. The maximum score counts every
/// question, answered or not, so skipped questions weigh the percentage down.
/// `passed` stays undecided while any essay answer awaits manual grading.
pub(crate) fn build_plan(
    questions: &[AssessmentQuestion],
    options: &[QuestionOption],
    answers: &[SubmittedAnswer],
    passing_score: f64,
) -> SubmissionPlan {
    let by_question: HashMap<&str, &AssessmentQuestion> = questions
        .iter()
        .map(|question| (question.question_id.as_str(), question))
        .collect();

    let mut correct_by_question: HashMap<&str, Vec<&str>> = HashMap::new();
    for option in options {
        if option.is_correct {
            correct_by_question
                .entry(option.question_id.as_str())
                .or_default()
                .push(option.text.as_str());
        }
    }

    let mut planned = Vec::new();
    let mut seen = HashSet::new();
    let mut score = 0.0;
    let mut has_essay = false;

    for answer in answers {
        let Some(question) = by_question.get(answer.question_id.as_str()) else {
            continue;
        };
        if !seen.insert(answer.question_id.as_str()) {
            continue;
        }

        let correct = correct_by_question
            .get(answer.question_id.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let verdict =
            answer_evaluator::evaluate(question.kind, question.points, correct, &answer.answer);
        if let Some(points) = verdict.points {
            score += points;
        }

        let is_essay = question.kind == QuestionKind::Essay;
        has_essay = has_essay || is_essay;

        planned.push(PlannedAnswer {
            question_id: answer.question_id.clone(),
            answer: answer.answer.clone(),
            verdict,
            is_essay,
        });
    }

    let max_score: f64 = questions.iter().map(|question| question.points).sum();
    let percentage = if max_score > 0.0 {
        score / max_score * 100.0
    } else {
        0.0
    };
    let passed = if has_essay {
        None
    } else {
        Some(percentage >= passing_score)
    };

    SubmissionPlan { answers: planned, score, max_score, percentage, passed }
}

/// Accepts an assessment submission in one transaction: the submission shell,
/// every answer record, and a pending grading task per essay answer all land
/// together or not at all.
pub(crate) async fn submit_assessment(
    state: &AppState,
    assessment_id: &str,
    student_id: &str,
    answers: &[SubmittedAnswer],
    time_spent_minutes: Option<i32>,
) -> Result<SubmissionOutcome, SubmitError> {
    let assessment = repositories::assessments::find_by_id(state.db(), assessment_id)
        .await
        .context("Failed to fetch assessment")?
        .ok_or(SubmitError::AssessmentNotFound)?;

    let enrolled =
        repositories::courses::is_enrolled(state.db(), &assessment.course_id, student_id)
            .await
            .context("Failed to check enrollment")?;
    if !enrolled {
        return Err(SubmitError::NotEnrolled);
    }

    let now = primitive_now_utc();
    if now < assessment.start_date || now > assessment.end_date {
        return Err(SubmitError::OutsideWindow);
    }

    let questions = repositories::assessments::questions_for_assessment(state.db(), assessment_id)
        .await
        .context("Failed to fetch assessment questions")?;
    let question_ids: Vec<String> = questions
        .iter()
        .map(|question| question.question_id.clone())
        .collect();
    let options = repositories::assessments::options_for_questions(state.db(), &question_ids)
        .await
        .context("Failed to fetch question options")?;

    let plan = build_plan(&questions, &options, answers, assessment.passing_score);

    let mut tx = state
        .db()
        .begin()
        .await
        .context("Failed to begin transaction")?;

    let submission_id = Uuid::new_v4().to_string();
    let created = repositories::submissions::create_if_absent(
        &mut *tx,
        repositories::submissions::CreateSubmission {
            id: &submission_id,
            assessment_id,
            student_id,
            score: plan.score,
            max_score: plan.max_score,
            percentage: plan.percentage,
            passed: plan.passed,
            time_spent_minutes,
            submitted_at: now,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .context("Failed to create submission")?;

    let Some(submission) = created else {
        return Err(SubmitError::AlreadySubmitted);
    };

    let mut pending_tasks = 0i64;
    for planned in &plan.answers {
        let answer_id = Uuid::new_v4().to_string();
        repositories::submissions::create_answer(
            &mut *tx,
            repositories::submissions::CreateAnswer {
                id: &answer_id,
                submission_id: &submission.id,
                question_id: &planned.question_id,
                answer: &planned.answer,
                is_correct: planned.verdict.is_correct,
                points: planned.verdict.points,
                created_at: now,
            },
        )
        .await
        .context("Failed to record answer")?;

        if planned.is_essay {
            let task_id = Uuid::new_v4().to_string();
            repositories::grading_tasks::create(
                &mut *tx,
                repositories::grading_tasks::CreateGradingTask {
                    id: &task_id,
                    submission_id: &submission.id,
                    question_id: &planned.question_id,
                    student_id,
                    answer: &planned.answer,
                    created_at: now,
                    updated_at: now,
                },
            )
            .await
            .context("Failed to stage grading task")?;
            pending_tasks += 1;
        }
    }

    tx.commit().await.context("Failed to commit submission")?;

    tracing::info!(
        submission_id = %submission.id,
        assessment_id = %assessment_id,
        score = submission.score,
        pending_tasks,
        "Assessment submission accepted"
    );

    Ok(SubmissionOutcome { submission, pending_tasks })
}

#[cfg(test)]
mod tests {
    use super::build_plan;
    use crate::db::models::{AssessmentQuestion, QuestionOption};
    use crate::db::types::QuestionKind;
    use crate::schemas::assessment::SubmittedAnswer;

    fn question(id: &str, kind: QuestionKind, points: f64) -> AssessmentQuestion {
        AssessmentQuestion {
            question_id: id.to_string(),
            order_index: 0,
            kind,
            text: format!("Question {id}"),
            points,
            explanation: None,
        }
    }

    fn option(question_id: &str, text: &str, is_correct: bool) -> QuestionOption {
        QuestionOption {
            id: format!("{question_id}-{text}"),
            question_id: question_id.to_string(),
            text: text.to_string(),
            is_correct,
            order_index: 0,
        }
    }

    fn answer(question_id: &str, text: &str) -> SubmittedAnswer {
        SubmittedAnswer { question_id: question_id.to_string(), answer: text.to_string() }
    }

    #[test]
    fn essay_defers_pass_flag_and_counts_toward_max() {
        let questions = vec![
            question("q1", QuestionKind::MultipleChoice, 10.0),
            question("q2", QuestionKind::Essay, 5.0),
        ];
        let options = vec![option("q1", "5", true), option("q1", "7", false)];
        let answers = vec![answer("q1", "5"), answer("q2", "x=5 because...")];

        let plan = build_plan(&questions, &options, &answers, 70.0);

        assert_eq!(plan.score, 10.0);
        assert_eq!(plan.max_score, 15.0);
        assert!((plan.percentage - 10.0 / 15.0 * 100.0).abs() < 1e-9);
        assert_eq!(plan.passed, None);

        let essay = plan.answers.iter().find(|a| a.question_id == "q2").unwrap();
        assert!(essay.is_essay);
        assert_eq!(essay.verdict.is_correct, None);
        assert_eq!(essay.verdict.points, None);
    }

    #[test]
    fn all_objective_answers_decide_passed_immediately() {
        let questions = vec![
            question("q1", QuestionKind::MultipleChoice, 10.0),
            question("q2", QuestionKind::TrueFalse, 10.0),
        ];
        let options = vec![
            option("q1", "Paris", true),
            option("q2", "True", true),
            option("q2", "False", false),
        ];
        let answers = vec![answer("q1", "Paris"), answer("q2", "False")];

        let plan = build_plan(&questions, &options, &answers, 50.0);

        assert_eq!(plan.score, 10.0);
        assert_eq!(plan.percentage, 50.0);
        assert_eq!(plan.passed, Some(true));
    }

    #[test]
    fn unanswered_questions_still_weigh_the_percentage() {
        let questions = vec![
            question("q1", QuestionKind::MultipleChoice, 10.0),
            question("q2", QuestionKind::MultipleChoice, 10.0),
        ];
        let options = vec![option("q1", "A", true), option("q2", "B", true)];
        let answers = vec![answer("q1", "A")];

        let plan = build_plan(&questions, &options, &answers, 70.0);

        assert_eq!(plan.answers.len(), 1);
        assert_eq!(plan.score, 10.0);
        assert_eq!(plan.max_score, 20.0);
        assert_eq!(plan.percentage, 50.0);
        assert_eq!(plan.passed, Some(false));
    }

    #[test]
    fn unknown_and_duplicate_answers_are_dropped() {
        let questions = vec![question("q1", QuestionKind::MultipleChoice, 10.0)];
        let options = vec![option("q1", "A", true)];
        let answers = vec![
            answer("q1", "wrong"),
            answer("q1", "A"),
            answer("ghost", "A"),
        ];

        let plan = build_plan(&questions, &options, &answers, 70.0);

        assert_eq!(plan.answers.len(), 1);
        assert_eq!(plan.score, 0.0);
    }

    #[test]
    fn empty_assessment_scores_zero_without_dividing() {
        let plan = build_plan(&[], &[], &[], 70.0);

        assert_eq!(plan.max_score, 0.0);
        assert_eq!(plan.percentage, 0.0);
        assert_eq!(plan.passed, Some(false));
    }
}
