use crate::db::types::QuestionKind;

/// Outcome of evaluating one answer. Essay answers stay undetermined until a
/// reviewer completes the grading task, so both fields are optional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AnswerVerdict {
    pub(crate) is_correct: Option<bool>,
    pub(crate) points: Option<f64>,
}

impl AnswerVerdict {
    fn decided(correct: bool, points: f64) -> Self {
        Self {
            is_correct: Some(correct),
            points: Some(if correct { points } else { 0.0 }),
        }
    }

    fn deferred() -> Self {
        Self {
            is_correct: None,
            points: None,
        }
    }
}

/// Scores a single answer against the question's correct options.
///
/// Choice questions match the exact option text after trimming; short answers
/// tolerate case differences as well. Essay answers are never auto-scored.
pub(crate) fn evaluate(
    kind: QuestionKind,
    points: f64,
    correct: &[&str],
    answer: &str,
) -> AnswerVerdict {
    match kind {
        QuestionKind::MultipleChoice | QuestionKind::TrueFalse => {
            let given = answer.trim();
            let matched = correct.iter().any(|text| text.trim() == given);
            AnswerVerdict::decided(matched, points)
        }
        QuestionKind::ShortAnswer => {
            let given = answer.trim().to_lowercase();
            let matched = correct
                .iter()
                .any(|text| text.trim().to_lowercase() == given);
            AnswerVerdict::decided(matched, points)
        }
        QuestionKind::Essay => AnswerVerdict::deferred(),
    }
}
