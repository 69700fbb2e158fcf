use crate::orchestration::error::StepError;
use crate::plan::Plan;
use crate::plan_run::PlanRun;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreStepIntrospectionOutcome {
    Continue,
    Skip,
    /// End the run now; remaining steps are not executed.
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreStepIntrospection {
    pub outcome: PreStepIntrospectionOutcome,
    #[serde(default)]
    pub reason: String,
}

impl PreStepIntrospection {
    pub fn new(outcome: PreStepIntrospectionOutcome, reason: impl Into<String>) -> Self {
        Self {
            outcome,
            reason: reason.into(),
        }
    }
}

/// Evaluates a step's guard condition against the run so far. Only consulted
/// for steps that declare a condition.
pub trait IntrospectionAgent: Send + Sync {
    fn pre_step_introspection(
        &self,
        plan: &Plan,
        plan_run: &PlanRun,
    ) -> Result<PreStepIntrospection, StepError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContinueAlways;

impl IntrospectionAgent for ContinueAlways {
    fn pre_step_introspection(
        &self,
        _plan: &Plan,
        _plan_run: &PlanRun,
    ) -> Result<PreStepIntrospection, StepError> {
        Ok(PreStepIntrospection::new(
            PreStepIntrospectionOutcome::Continue,
            "",
        ))
    }
}
