use anyhow::Context;

use crate::core::state::AppState;
use crate::db::models::GradeCriterion;
use crate::db::types::{AssessmentKind, GradeCategory, GradingSystemType};
use crate::repositories;

pub(crate) const DEFAULT_PASSING_SCORE: f64 = 70.0;

/// One grading category with its configured weight and the student's average
/// over finalized work in it, or None when nothing is scored there yet.
#[derive(Debug)]
pub(crate) struct CategoryScore {
    pub(crate) category: GradeCategory,
    pub(crate) weight: f64,
    pub(crate) average: Option<f64>,
}

#[derive(Debug)]
pub(crate) struct StudentGrade {
    pub(crate) percentage: f64,
    pub(crate) grade: String,
    pub(crate) system_type: GradingSystemType,
}

/// Weighted course percentage over the categories that have finalized work.
///
/// A category without any scored item drops out entirely and the remaining
/// weights are renormalized, so a student assessed in one category so far is
/// graded on that category alone. Returns None when nothing contributes.
pub(crate) fn weighted_percentage(scores: &[CategoryScore]) -> Option<f64> {
    let mut contributing = Vec::new();
    for score in scores {
        if let Some(average) = score.average {
            contributing.push((average, score.weight));
        }
    }

    let total_weight: f64 = contributing.iter().map(|(_, weight)| weight).sum();
    if contributing.is_empty() || total_weight <= 0.0 {
        return None;
    }

    let weighted: f64 = contributing
        .iter()
        .map(|(average, weight)| average / 100.0 * weight)
        .sum();
    Some(weighted / total_weight * 100.0)
}

/// Maps a course percentage onto the grading system's label.
///
/// Criteria must arrive ordered from the highest band down; a percentage below
/// every band still earns the lowest one. Returns None only for a GRADE system
/// without any configured band.
pub(crate) fn resolve_grade(
    system_type: GradingSystemType,
    passing_score: Option<f64>,
    criteria: &[GradeCriterion],
    percentage: f64,
) -> Option<String> {
    match system_type {
        GradingSystemType::PassFail => {
            let threshold = passing_score.unwrap_or(DEFAULT_PASSING_SCORE);
            let label = if percentage >= threshold { "PASS" } else { "FAIL" };
            Some(label.to_string())
        }
        GradingSystemType::Grade => criteria
            .iter()
            .find(|criterion| percentage >= criterion.min_score)
            .or_else(|| criteria.last())
            .map(|criterion| criterion.grade.clone()),
    }
}

/// Computes the student's final course grade, or None when the course has no
/// usable grading configuration or the student has no finalized work at all.
pub(crate) async fn student_course_grade(
    state: &AppState,
    course_id: &str,
    student_id: &str,
) -> anyhow::Result<Option<StudentGrade>> {
    let Some(system) = repositories::grading_systems::find_for_course(state.db(), course_id)
        .await
        .context("Failed to fetch grading system")?
    else {
        return Ok(None);
    };

    let criteria = if system.system_type == GradingSystemType::Grade {
        repositories::grading_systems::criteria_for_system(state.db(), &system.id)
            .await
            .context("Failed to fetch grade criteria")?
    } else {
        Vec::new()
    };

    let weights = repositories::grading_systems::weights_for_course(state.db(), course_id)
        .await
        .context("Failed to fetch grade weights")?;

    let mut scores = Vec::with_capacity(weights.len());
    for weight in &weights {
        let percentages =
            category_percentages(state, course_id, student_id, weight.category).await?;
        let average = if percentages.is_empty() {
            None
        } else {
            Some(percentages.iter().sum::<f64>() / percentages.len() as f64)
        };
        scores.push(CategoryScore { category: weight.category, weight: weight.weight, average });
    }

    let Some(percentage) = weighted_percentage(&scores) else {
        return Ok(None);
    };
    let Some(grade) = resolve_grade(system.system_type, system.passing_score, &criteria, percentage)
    else {
        return Ok(None);
    };

    Ok(Some(StudentGrade { percentage, grade, system_type: system.system_type }))
}

async fn category_percentages(
    state: &AppState,
    course_id: &str,
    student_id: &str,
    category: GradeCategory,
) -> anyhow::Result<Vec<f64>> {
    let percentages = match category {
        GradeCategory::Quiz => {
            repositories::submissions::finalized_percentages(
                state.db(),
                course_id,
                student_id,
                &[AssessmentKind::Quiz],
            )
            .await
            .context("Failed to fetch quiz percentages")?
        }
        GradeCategory::Exam => {
            repositories::submissions::finalized_percentages(
                state.db(),
                course_id,
                student_id,
                &[AssessmentKind::Midterm, AssessmentKind::Final],
            )
            .await
            .context("Failed to fetch exam percentages")?
        }
        GradeCategory::Assignment => {
            repositories::assignments::graded_percentages(state.db(), course_id, student_id)
                .await
                .context("Failed to fetch assignment percentages")?
        }
    };
    Ok(percentages)
}

#[cfg(test)]
mod tests {
    use time::{Date, PrimitiveDateTime, Time};

    use super::*;

    fn score(category: GradeCategory, weight: f64, average: Option<f64>) -> CategoryScore {
        CategoryScore { category, weight, average }
    }

    fn criterion(grade: &str, min_score: f64) -> GradeCriterion {
        let stamp = PrimitiveDateTime::new(
            Date::from_calendar_date(2025, time::Month::January, 2).unwrap(),
            Time::MIDNIGHT,
        );
        GradeCriterion {
            id: format!("criterion-{grade}"),
            grading_system_id: "system-1".to_string(),
            grade: grade.to_string(),
            min_score,
            created_at: stamp,
            updated_at: stamp,
        }
    }

    #[test]
    fn empty_categories_renormalize_the_weights() {
        let scores = [
            score(GradeCategory::Quiz, 40.0, Some(80.0)),
            score(GradeCategory::Assignment, 60.0, None),
        ];

        assert_eq!(weighted_percentage(&scores), Some(80.0));
    }

    #[test]
    fn contributing_categories_combine_by_weight() {
        let scores = [
            score(GradeCategory::Quiz, 40.0, Some(80.0)),
            score(GradeCategory::Assignment, 60.0, Some(90.0)),
        ];

        let percentage = weighted_percentage(&scores).unwrap();
        assert!((percentage - 86.0).abs() < 1e-9);
    }

    #[test]
    fn nothing_scored_yields_no_percentage() {
        let scores = [
            score(GradeCategory::Quiz, 40.0, None),
            score(GradeCategory::Exam, 60.0, None),
        ];

        assert_eq!(weighted_percentage(&scores), None);
        assert_eq!(weighted_percentage(&[]), None);
    }

    #[test]
    fn bands_resolve_highest_first() {
        let criteria = [criterion("A", 90.0), criterion("B", 80.0), criterion("C", 70.0)];

        let grade = resolve_grade(GradingSystemType::Grade, None, &criteria, 85.0);
        assert_eq!(grade.as_deref(), Some("B"));
    }

    #[test]
    fn below_every_band_earns_the_lowest_one() {
        let criteria = [criterion("A", 90.0), criterion("B", 80.0), criterion("C", 70.0)];

        let grade = resolve_grade(GradingSystemType::Grade, None, &criteria, 42.0);
        assert_eq!(grade.as_deref(), Some("C"));
    }

    #[test]
    fn grade_system_without_bands_resolves_nothing() {
        assert_eq!(resolve_grade(GradingSystemType::Grade, None, &[], 85.0), None);
    }

    #[test]
    fn pass_fail_uses_the_default_threshold() {
        let pass = resolve_grade(GradingSystemType::PassFail, None, &[], 70.0);
        let fail = resolve_grade(GradingSystemType::PassFail, None, &[], 69.9);

        assert_eq!(pass.as_deref(), Some("PASS"));
        assert_eq!(fail.as_deref(), Some("FAIL"));
    }

    #[test]
    fn pass_fail_honors_a_configured_threshold() {
        let grade = resolve_grade(GradingSystemType::PassFail, Some(50.0), &[], 60.0);
        assert_eq!(grade.as_deref(), Some("PASS"));
    }
}
