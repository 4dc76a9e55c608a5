pub(crate) mod assessments;
pub(crate) mod assignments;
pub(crate) mod courses;
pub(crate) mod grading_systems;
pub(crate) mod grading_tasks;
pub(crate) mod submissions;
pub(crate) mod training;
pub(crate) mod users;

/// Visibility scope for reviewer-facing listings, derived from the caller's
/// role before any query runs.
#[derive(Debug, Clone)]
pub(crate) enum ReviewScope {
    All,
    School(String),
    Courses(Vec<String>),
}
