use crate::clarification::Clarification;
use crate::config::EngineConfig;
use crate::plan::Plan;
use crate::plan_run::PlanRun;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Reserved tool id that always resolves to the built-in [`LlmTool`].
pub const LLM_TOOL_ID: &str = "llm_tool";

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool `{tool_id}` is not registered")]
    NotFound { tool_id: String },
    #[error("readiness check failed for tool `{tool_id}`: {reason}")]
    Readiness { tool_id: String, reason: String },
}

/// Remote tools are checked as one group through [`RemoteToolBatch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolFamily {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadyResponse {
    pub ready: bool,
    pub clarifications: Vec<Clarification>,
}

impl ReadyResponse {
    pub fn ready() -> Self {
        Self {
            ready: true,
            clarifications: Vec::new(),
        }
    }

    pub fn not_ready(clarifications: Vec<Clarification>) -> Self {
        Self {
            ready: false,
            clarifications,
        }
    }
}

pub struct ToolRunContext<'a> {
    pub end_user_id: &'a str,
    pub plan: &'a Plan,
    pub plan_run: &'a PlanRun,
    pub config: &'a EngineConfig,
}

pub trait Tool: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str {
        self.id()
    }

    fn description(&self) -> &str {
        ""
    }

    fn family(&self) -> ToolFamily {
        ToolFamily::Local
    }

    fn ready(&self, _ctx: &ToolRunContext<'_>) -> Result<ReadyResponse, ToolError> {
        Ok(ReadyResponse::ready())
    }
}

/// General-purpose tool backed by the execution agent's own model.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlmTool;

impl Tool for LlmTool {
    fn id(&self) -> &str {
        LLM_TOOL_ID
    }

    fn name(&self) -> &str {
        "LLM Tool"
    }

    fn description(&self) -> &str {
        "answers the task directly using the language model"
    }
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Replaces any tool already registered under the same id.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.id().to_string(), tool);
    }

    pub fn get_tool(&self, tool_id: &str) -> Result<Arc<dyn Tool>, ToolError> {
        if tool_id == LLM_TOOL_ID {
            return Ok(Arc::new(LlmTool));
        }
        self.tools
            .get(tool_id)
            .cloned()
            .ok_or_else(|| ToolError::NotFound {
                tool_id: tool_id.to_string(),
            })
    }

    pub fn ids(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub trait RemoteToolBatch: Send + Sync {
    fn batch_ready(
        &self,
        config: &EngineConfig,
        tool_ids: &BTreeSet<String>,
        ctx: &ToolRunContext<'_>,
    ) -> Result<ReadyResponse, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Tool for Named {
        fn id(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn reserved_id_resolves_without_registration() {
        let registry = ToolRegistry::new().with_tool(Arc::new(Named(LLM_TOOL_ID)));
        let tool = registry.get_tool(LLM_TOOL_ID).expect("llm tool");
        assert_eq!(tool.name(), "LLM Tool");
        assert!(matches!(
            registry.get_tool("search"),
            Err(ToolError::NotFound { .. })
        ));
    }
}
