use crate::config::EngineConfig;
use crate::orchestration::error::StepError;
use crate::output::Output;
use crate::plan::{Plan, Step};
use crate::plan_run::PlanRun;
use crate::tool::{Tool, LLM_TOOL_ID};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionAgentKind {
    /// Multi-turn agent that may ask for clarifications between tool calls.
    #[default]
    Default,
    OneShot,
}

impl std::fmt::Display for ExecutionAgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionAgentKind::Default => write!(f, "default"),
            ExecutionAgentKind::OneShot => write!(f, "one_shot"),
        }
    }
}

/// Everything an execution agent is bound to for one step.
pub struct AgentContext<'a> {
    pub plan: &'a Plan,
    pub plan_run: &'a PlanRun,
    pub step: &'a Step,
    pub step_index: usize,
    pub tool: Option<Arc<dyn Tool>>,
    pub end_user_id: &'a str,
    pub config: &'a EngineConfig,
}

pub trait ExecutionAgent {
    /// Runs the step to completion. Clarifications are returned inside the output.
    fn execute_sync(&mut self) -> Result<Output, StepError>;
}

pub trait AgentFactory: Send + Sync {
    fn build<'a>(
        &self,
        kind: ExecutionAgentKind,
        ctx: AgentContext<'a>,
    ) -> Result<Box<dyn ExecutionAgent + 'a>, StepError>;
}

/// The built-in LLM tool always runs under the one-shot agent.
pub fn select_agent_kind(
    configured: ExecutionAgentKind,
    tool: Option<&dyn Tool>,
) -> ExecutionAgentKind {
    match tool {
        Some(tool) if tool.id() == LLM_TOOL_ID => ExecutionAgentKind::OneShot,
        _ => configured,
    }
}
