use crate::plan::Plan;
use crate::plan_run::PlanRun;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("summarizer failed: {0}")]
pub struct SummarizerError(pub String);

#[derive(Debug, Clone, PartialEq)]
pub enum FinalSummary {
    Text(String),
    /// Replacement value conforming to the run's structured output schema.
    Structured { value: Value, summary: String },
}

pub trait OutputSummarizer: Send + Sync {
    fn create_summary(
        &self,
        plan: &Plan,
        plan_run: &PlanRun,
    ) -> Result<Option<FinalSummary>, SummarizerError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoSummary;

impl OutputSummarizer for NoSummary {
    fn create_summary(
        &self,
        _plan: &Plan,
        _plan_run: &PlanRun,
    ) -> Result<Option<FinalSummary>, SummarizerError> {
        Ok(None)
    }
}
