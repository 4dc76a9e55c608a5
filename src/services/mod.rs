pub(crate) mod ai_assist;
pub(crate) mod answer_evaluator;
pub(crate) mod grade_aggregator;
pub(crate) mod grading_workflow;
pub(crate) mod storage;
pub(crate) mod submission_intake;
pub(crate) mod training_pipeline;
pub(crate) mod training_provider;
