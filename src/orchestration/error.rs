use crate::config::ConfigError;
use crate::plan_run::PlanRunState;
use crate::store::StoreError;
use crate::tool::ToolError;

/// Errors surfaced to callers of the engine. Pauses and step failures are never
/// reported here; they show up in the returned run's state.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("plan run `{run_id}` is in state `{state}` and cannot {operation}")]
    InvalidPlanRunState {
        run_id: String,
        state: PlanRunState,
        operation: String,
    },
    #[error("clarification `{clarification_id}` not found in plan run `{run_id}`")]
    ClarificationNotFound {
        clarification_id: String,
        run_id: String,
    },
    #[error("plan run `{run_id}` was not ready to resume after {retries} retries")]
    WaitTimeout { run_id: String, retries: u32 },
    #[error("wait for plan run `{run_id}` was interrupted")]
    WaitInterrupted { run_id: String },
    #[error("plan `{plan_id}` is missing required inputs: {}", .missing.join(", "))]
    MissingPlanInputs {
        plan_id: String,
        missing: Vec<String>,
    },
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Precondition failures: the caller asked for something the run cannot do.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidPlanRunState { .. }
                | EngineError::ClarificationNotFound { .. }
                | EngineError::MissingPlanInputs { .. }
                | EngineError::Store(StoreError::PlanNotFound { .. })
                | EngineError::Store(StoreError::PlanRunNotFound { .. })
        )
    }
}

/// Failure inside one step. Captured as the step's output; never raised by resume.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("{0}")]
    Agent(String),
    #[error("tool `{tool_id}` failed: {reason}")]
    Tool { tool_id: String, reason: String },
    #[error("introspection failed: {0}")]
    Introspection(String),
}

impl From<ToolError> for StepError {
    fn from(value: ToolError) -> Self {
        match value {
            ToolError::NotFound { tool_id } => StepError::Tool {
                tool_id,
                reason: "not registered".to_string(),
            },
            ToolError::Readiness { tool_id, reason } => StepError::Tool { tool_id, reason },
        }
    }
}
