use crate::clarification::Clarification;
use crate::orchestration::engine::PlanRunEngine;
use crate::orchestration::error::EngineError;
use crate::plan::Plan;
use crate::plan_run::PlanRun;
use crate::shared::logging::LogLevel;
use crate::tool::{ToolFamily, ToolRunContext};
use std::collections::BTreeSet;

impl PlanRunEngine {
    /// Readiness gate over steps `[from_index, end)`.
    ///
    /// Each distinct tool is checked once, at its first occurrence. Remote tools
    /// are collected and checked with one batched query after the scan.
    pub fn check_readiness(
        &self,
        plan: &Plan,
        run: &PlanRun,
        from_index: usize,
    ) -> Result<Vec<Clarification>, EngineError> {
        let ctx = ToolRunContext {
            end_user_id: &run.end_user_id,
            plan,
            plan_run: run,
            config: &self.config,
        };
        let mut seen = BTreeSet::new();
        let mut remote = BTreeSet::new();
        let mut clarifications = Vec::new();

        for step in plan.steps.iter().skip(from_index) {
            let Some(tool_id) = step.tool_id.as_deref() else {
                continue;
            };
            if !seen.insert(tool_id) {
                continue;
            }
            let tool = self.tools.get_tool(tool_id)?;
            if tool.family() == ToolFamily::Remote && self.remote_tools.is_some() {
                remote.insert(tool_id.to_string());
                continue;
            }
            let response = tool.ready(&ctx)?;
            if !response.ready {
                clarifications.extend(response.clarifications);
            }
        }

        if let Some(batch) = self.remote_tools.as_ref().filter(|_| !remote.is_empty()) {
            let response = batch.batch_ready(&self.config, &remote, &ctx)?;
            if !response.ready {
                clarifications.extend(response.clarifications);
            }
        }

        if !clarifications.is_empty() {
            self.log(
                LogLevel::Info,
                "readiness_gate",
                format!(
                    "run_id={} from_index={from_index} tools={} remote_tools={} clarifications={}",
                    run.id,
                    seen.len(),
                    remote.len(),
                    clarifications.len()
                ),
            );
        }
        Ok(clarifications)
    }
}
