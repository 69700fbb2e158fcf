use crate::config::EngineConfig;
use crate::orchestration::agents::AgentFactory;
use crate::orchestration::error::EngineError;
use crate::orchestration::hooks::{ExecutionHooks, NoHooks};
use crate::orchestration::introspection::{ContinueAlways, IntrospectionAgent};
use crate::orchestration::summarizer::{NoSummary, OutputSummarizer};
use crate::plan::Plan;
use crate::plan_run::{PlanRun, PlanRunState};
use crate::shared::ids::{PlanId, PlanRunId};
use crate::shared::logging::{LogLevel, NoopLogger, RunLogger};
use crate::shared::time::now_secs;
use crate::store::{open_storage, Storage};
use crate::tool::{RemoteToolBatch, ToolRegistry};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Drives plan runs from creation to a terminal state.
///
/// The engine holds no per-run state of its own: everything mutable lives in the
/// [`PlanRun`] and the backing store, so one engine can drive many runs from
/// different threads.
pub struct PlanRunEngine {
    pub(crate) config: EngineConfig,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) tools: ToolRegistry,
    pub(crate) agents: Arc<dyn AgentFactory>,
    pub(crate) introspection: Arc<dyn IntrospectionAgent>,
    pub(crate) summarizer: Arc<dyn OutputSummarizer>,
    pub(crate) hooks: Arc<dyn ExecutionHooks>,
    pub(crate) remote_tools: Option<Arc<dyn RemoteToolBatch>>,
    pub(crate) logger: Arc<dyn RunLogger>,
    pub(crate) interrupt: Arc<AtomicBool>,
}

impl PlanRunEngine {
    pub fn new(
        config: EngineConfig,
        storage: Arc<dyn Storage>,
        tools: ToolRegistry,
        agents: Arc<dyn AgentFactory>,
    ) -> Self {
        Self {
            config,
            storage,
            tools,
            agents,
            introspection: Arc::new(ContinueAlways),
            summarizer: Arc::new(NoSummary),
            hooks: Arc::new(NoHooks),
            remote_tools: None,
            logger: Arc::new(NoopLogger),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Validates `config` and opens the storage backend it names.
    pub fn from_config(
        config: EngineConfig,
        tools: ToolRegistry,
        agents: Arc<dyn AgentFactory>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let storage = open_storage(&config.storage)?;
        Ok(Self::new(config, storage, tools, agents))
    }

    pub fn with_introspection(mut self, introspection: Arc<dyn IntrospectionAgent>) -> Self {
        self.introspection = introspection;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn OutputSummarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ExecutionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_remote_tools(mut self, remote_tools: Arc<dyn RemoteToolBatch>) -> Self {
        self.remote_tools = Some(remote_tools);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn RunLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Shares an interrupt flag with the caller. Setting it fails the run being
    /// driven at the next step boundary.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn create_plan_run(
        &self,
        plan: &Plan,
        end_user_id: Option<&str>,
        inputs: BTreeMap<String, Value>,
    ) -> Result<PlanRun, EngineError> {
        let end_user_id = end_user_id.unwrap_or(&self.config.default_end_user);
        let mut run = PlanRun::new(plan.id.clone(), end_user_id);
        run.structured_output_schema = plan.structured_output_schema.clone();
        run.plan_run_inputs = self.accept_plan_inputs(plan, &run.id, inputs)?;
        self.storage.save_plan_run(&run)?;
        self.log(
            LogLevel::Info,
            "plan_run_created",
            format!(
                "run_id={} plan_id={} end_user_id={} inputs={}",
                run.id,
                plan.id,
                run.end_user_id,
                run.plan_run_inputs.len()
            ),
        );
        Ok(run)
    }

    fn accept_plan_inputs(
        &self,
        plan: &Plan,
        run_id: &PlanRunId,
        mut inputs: BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, EngineError> {
        if plan.plan_inputs.is_empty() {
            if !inputs.is_empty() {
                self.log(
                    LogLevel::Warn,
                    "plan_inputs_ignored",
                    format!(
                        "run_id={run_id} plan_id={} reason=plan declares no inputs count={}",
                        plan.id,
                        inputs.len()
                    ),
                );
            }
            return Ok(BTreeMap::new());
        }

        let missing: Vec<String> = plan
            .plan_inputs
            .iter()
            .filter(|input| !inputs.contains_key(&input.name))
            .map(|input| input.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::MissingPlanInputs {
                plan_id: plan.id.to_string(),
                missing,
            });
        }

        let mut accepted = BTreeMap::new();
        for declared in &plan.plan_inputs {
            if let Some(value) = inputs.remove(&declared.name) {
                accepted.insert(declared.name.clone(), value);
            }
        }
        for unknown in inputs.keys() {
            self.log(
                LogLevel::Warn,
                "plan_input_unknown",
                format!("run_id={run_id} plan_id={} input={unknown}", plan.id),
            );
        }
        Ok(accepted)
    }

    /// Stores `plan` if needed, creates a run for it and drives the run.
    pub fn run_plan(
        &self,
        plan: &Plan,
        end_user_id: Option<&str>,
        inputs: BTreeMap<String, Value>,
    ) -> Result<PlanRun, EngineError> {
        if !self.storage.plan_exists(&plan.id)? {
            self.storage.save_plan(plan)?;
        }
        let run = self.create_plan_run(plan, end_user_id, inputs)?;
        self.resume_run(run)
    }

    pub fn run_plan_by_id(
        &self,
        plan_id: &PlanId,
        end_user_id: Option<&str>,
        inputs: BTreeMap<String, Value>,
    ) -> Result<PlanRun, EngineError> {
        let plan = self.storage.get_plan(plan_id)?;
        let run = self.create_plan_run(&plan, end_user_id, inputs)?;
        self.resume_run(run)
    }

    pub fn resume(&self, run_id: &PlanRunId) -> Result<PlanRun, EngineError> {
        let run = self.storage.get_plan_run(run_id)?;
        self.resume_run(run)
    }

    /// Continues `run` from its current step index.
    ///
    /// Returns normally when the run pauses for clarifications, completes or
    /// fails; callers inspect the returned state.
    pub fn resume_run(&self, mut run: PlanRun) -> Result<PlanRun, EngineError> {
        if !run.state.is_resumable() {
            return Err(EngineError::InvalidPlanRunState {
                run_id: run.id.to_string(),
                state: run.state,
                operation: "resume".to_string(),
            });
        }
        let plan = self.storage.get_plan(&run.plan_id)?;
        self.log(
            LogLevel::Info,
            "plan_run_resume",
            format!(
                "run_id={} state={} step_index={}",
                run.id, run.state, run.current_step_index
            ),
        );

        let mut pending = run.outstanding_clarifications();
        pending.extend(self.check_readiness(&plan, &run, run.current_step_index)?);
        if !pending.is_empty() {
            self.raise_clarifications(&mut run, pending)?;
            run = self.handle_clarifications(&plan, run)?;
            if run.has_outstanding_clarifications() || run.state.is_terminal() {
                return Ok(run);
            }
        }

        self.execute_and_handle_clarifications(&plan, run)
    }

    /// Runs the step loop, offering any raised clarifications to the configured
    /// handler, until the run is terminal or waits on the caller.
    pub fn execute_and_handle_clarifications(
        &self,
        plan: &Plan,
        mut run: PlanRun,
    ) -> Result<PlanRun, EngineError> {
        while !run.state.is_terminal() {
            run = self.execute_plan_run(plan, run)?;
            run = self.handle_clarifications(plan, run)?;
            if run.has_outstanding_clarifications() {
                return Ok(run);
            }
        }
        Ok(run)
    }

    pub(crate) fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    /// Moves `run` to `next` and persists it.
    pub(crate) fn set_state(
        &self,
        run: &mut PlanRun,
        next: PlanRunState,
    ) -> Result<(), EngineError> {
        if !run.state.can_transition_to(next) {
            return Err(EngineError::InvalidPlanRunState {
                run_id: run.id.to_string(),
                state: run.state,
                operation: format!("transition to {next}"),
            });
        }
        let previous = run.state;
        run.state = next;
        self.save_run(run)?;
        if previous != next {
            self.log(
                LogLevel::Info,
                "plan_run_state",
                format!("run_id={} from={previous} to={next}", run.id),
            );
        }
        Ok(())
    }

    pub(crate) fn save_run(&self, run: &mut PlanRun) -> Result<(), EngineError> {
        run.updated_at = now_secs();
        self.storage.save_plan_run(run)?;
        Ok(())
    }

    /// Fails a run on behalf of the caller's interrupt.
    pub(crate) fn fail_interrupted(&self, run: &mut PlanRun) -> Result<(), EngineError> {
        self.log(
            LogLevel::Warn,
            "plan_run_interrupted",
            format!(
                "run_id={} step_index={} transition=failed",
                run.id, run.current_step_index
            ),
        );
        if run.state.is_terminal() {
            return Ok(());
        }
        self.set_state(run, PlanRunState::Failed)
    }

    pub(crate) fn log(&self, level: LogLevel, event: &str, message: String) {
        self.logger.log(level, event, &message);
    }
}
