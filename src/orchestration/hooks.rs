use crate::clarification::Clarification;
use crate::output::Output;
use crate::plan::{Plan, Step};
use crate::plan_run::PlanRun;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BeforeStepOutcome {
    #[default]
    Continue,
    /// Bypass the step entirely: no agent call, no output recorded.
    Skip,
}

/// Lifecycle callbacks. Hooks see read-only snapshots; only the engine mutates runs.
pub trait ExecutionHooks: Send + Sync {
    fn before_plan_run(&self, _plan: &Plan, _plan_run: &PlanRun) {}

    fn before_step_execution(
        &self,
        _plan: &Plan,
        _plan_run: &PlanRun,
        _step: &Step,
    ) -> BeforeStepOutcome {
        BeforeStepOutcome::Continue
    }

    fn after_step_execution(
        &self,
        _plan: &Plan,
        _plan_run: &PlanRun,
        _step: &Step,
        _output: &Output,
    ) {
    }

    fn after_plan_run(&self, _plan: &Plan, _plan_run: &PlanRun, _final_output: &Output) {}

    fn clarification_handler(&self) -> Option<&dyn ClarificationHandler> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClarificationResolution {
    Resolved(Value),
    Failed(String),
    /// Resolution happens out of band; the engine waits for it.
    Pending,
}

pub trait ClarificationHandler: Send + Sync {
    fn handle(&self, clarification: &Clarification) -> ClarificationResolution;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ExecutionHooks for NoHooks {}
