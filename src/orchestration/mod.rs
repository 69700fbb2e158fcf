pub mod agents;
pub mod clarifications;
pub mod engine;
pub mod error;
pub mod final_output;
pub mod hooks;
pub mod introspection;
pub mod readiness;
pub mod step_loop;
pub mod summarizer;

pub use agents::{select_agent_kind, AgentContext, AgentFactory, ExecutionAgent, ExecutionAgentKind};
pub use clarifications::{WaitOptions, ACTION_COMPLETE_RESPONSE};
pub use engine::PlanRunEngine;
pub use error::{EngineError, StepError};
pub use hooks::{
    BeforeStepOutcome, ClarificationHandler, ClarificationResolution, ExecutionHooks, NoHooks,
};
pub use introspection::{
    ContinueAlways, IntrospectionAgent, PreStepIntrospection, PreStepIntrospectionOutcome,
};
pub use summarizer::{FinalSummary, NoSummary, OutputSummarizer, SummarizerError};
