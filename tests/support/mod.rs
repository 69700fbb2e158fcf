#![allow(dead_code)]

use runwright::clarification::Clarification;
use runwright::config::EngineConfig;
use runwright::orchestration::{
    AgentContext, AgentFactory, BeforeStepOutcome, ClarificationHandler, ExecutionAgent,
    ExecutionAgentKind, ExecutionHooks, PlanRunEngine, StepError, WaitOptions,
};
use runwright::output::Output;
use runwright::plan::{Plan, Step};
use runwright::plan_run::PlanRun;
use runwright::shared::ids::ClarificationId;
use runwright::store::InMemoryStorage;
use runwright::tool::{ReadyResponse, Tool, ToolError, ToolFamily, ToolRegistry, ToolRunContext};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Behavior = dyn Fn(&AgentContext<'_>) -> Result<Output, StepError> + Send + Sync;

/// Agent factory whose agents run a shared closure and record every invocation.
pub struct ScriptedAgents {
    behavior: Arc<Behavior>,
    invocations: Arc<Mutex<Vec<(usize, ExecutionAgentKind)>>>,
}

impl ScriptedAgents {
    pub fn new(
        behavior: impl Fn(&AgentContext<'_>) -> Result<Output, StepError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            behavior: Arc::new(behavior),
            invocations: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Every step answers with its index and task.
    pub fn echo() -> Arc<Self> {
        Self::new(|ctx| Ok(echo_output(ctx)))
    }

    /// Steps at `failing_index` fail; every other step echoes.
    pub fn failing_at(failing_index: usize) -> Arc<Self> {
        Self::new(move |ctx| {
            if ctx.step_index == failing_index {
                Err(StepError::Agent(format!("boom at step {failing_index}")))
            } else {
                Ok(echo_output(ctx))
            }
        })
    }

    pub fn calls(&self) -> usize {
        self.invocations.lock().expect("invocations lock").len()
    }

    pub fn calls_for_step(&self, index: usize) -> usize {
        self.invocations
            .lock()
            .expect("invocations lock")
            .iter()
            .filter(|(step, _)| *step == index)
            .count()
    }

    pub fn kinds(&self) -> Vec<ExecutionAgentKind> {
        self.invocations
            .lock()
            .expect("invocations lock")
            .iter()
            .map(|(_, kind)| *kind)
            .collect()
    }
}

pub fn echo_output(ctx: &AgentContext<'_>) -> Output {
    Output::value_with_summary(
        json!({ "index": ctx.step_index, "task": ctx.step.task }),
        format!("did {}", ctx.step.task),
    )
}

struct ScriptedAgent<'a> {
    ctx: AgentContext<'a>,
    kind: ExecutionAgentKind,
    behavior: Arc<Behavior>,
    invocations: Arc<Mutex<Vec<(usize, ExecutionAgentKind)>>>,
}

impl ExecutionAgent for ScriptedAgent<'_> {
    fn execute_sync(&mut self) -> Result<Output, StepError> {
        self.invocations
            .lock()
            .expect("invocations lock")
            .push((self.ctx.step_index, self.kind));
        (self.behavior)(&self.ctx)
    }
}

impl AgentFactory for ScriptedAgents {
    fn build<'a>(
        &self,
        kind: ExecutionAgentKind,
        ctx: AgentContext<'a>,
    ) -> Result<Box<dyn ExecutionAgent + 'a>, StepError> {
        Ok(Box::new(ScriptedAgent {
            ctx,
            kind,
            behavior: Arc::clone(&self.behavior),
            invocations: Arc::clone(&self.invocations),
        }))
    }
}

/// Tool whose readiness follows a flag. When not ready it answers with one ACTION
/// clarification whose id is stable for the lifetime of the tool.
pub struct FlagTool {
    id: String,
    family: ToolFamily,
    ready: AtomicBool,
    clarification_id: ClarificationId,
    checks: AtomicUsize,
}

impl FlagTool {
    pub fn local(id: &str, ready: bool) -> Arc<Self> {
        Self::with_family(id, ready, ToolFamily::Local)
    }

    pub fn remote(id: &str, ready: bool) -> Arc<Self> {
        Self::with_family(id, ready, ToolFamily::Remote)
    }

    fn with_family(id: &str, ready: bool, family: ToolFamily) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            family,
            ready: AtomicBool::new(ready),
            clarification_id: ClarificationId::generate(),
            checks: AtomicUsize::new(0),
        })
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn clarification_id(&self) -> &ClarificationId {
        &self.clarification_id
    }

    pub fn authorization_clarification(&self, plan_run: &PlanRun) -> Clarification {
        Clarification::action(
            plan_run.id.clone(),
            format!("authorize {}", self.id),
            format!("https://auth.example.test/{}", self.id),
        )
        .with_id(self.clarification_id.clone())
        .with_source(self.id.clone())
    }
}

impl Tool for FlagTool {
    fn id(&self) -> &str {
        &self.id
    }

    fn family(&self) -> ToolFamily {
        self.family
    }

    fn ready(&self, ctx: &ToolRunContext<'_>) -> Result<ReadyResponse, ToolError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.is_ready() {
            Ok(ReadyResponse::ready())
        } else {
            Ok(ReadyResponse::not_ready(vec![
                self.authorization_clarification(ctx.plan_run)
            ]))
        }
    }
}

/// Records every hook call as a short event string.
#[derive(Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<String>>,
    bypass_outputs: Vec<String>,
    handler: Option<Arc<dyn ClarificationHandler>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bypassing(mut self, output_key: &str) -> Self {
        self.bypass_outputs.push(output_key.to_string());
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn ClarificationHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }

    fn record(&self, event: String) {
        self.events.lock().expect("events lock").push(event);
    }
}

impl ExecutionHooks for RecordingHooks {
    fn before_plan_run(&self, _plan: &Plan, _plan_run: &PlanRun) {
        self.record("before_run".to_string());
    }

    fn before_step_execution(
        &self,
        _plan: &Plan,
        _plan_run: &PlanRun,
        step: &Step,
    ) -> BeforeStepOutcome {
        self.record(format!("before_step:{}", step.output));
        if self.bypass_outputs.contains(&step.output) {
            BeforeStepOutcome::Skip
        } else {
            BeforeStepOutcome::Continue
        }
    }

    fn after_step_execution(
        &self,
        _plan: &Plan,
        _plan_run: &PlanRun,
        step: &Step,
        output: &Output,
    ) {
        self.record(format!("after_step:{}:{}", step.output, output.kind()));
    }

    fn after_plan_run(&self, _plan: &Plan, _plan_run: &PlanRun, final_output: &Output) {
        self.record(format!("after_run:{}", final_output.kind()));
    }

    fn clarification_handler(&self) -> Option<&dyn ClarificationHandler> {
        self.handler.as_deref()
    }
}

pub fn three_step_plan() -> Plan {
    Plan::new(
        "send the morning digest",
        vec![
            Step::new("fetch unread mail", "$mail").with_tool("mail"),
            Step::new("summarize the mail", "$summary").with_tool("calendar"),
            Step::new("send the digest", "$digest").with_tool("sender"),
        ],
    )
}

pub fn ready_tools() -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(FlagTool::local("mail", true))
        .with_tool(FlagTool::local("calendar", true))
        .with_tool(FlagTool::local("sender", true))
}

pub fn memory_engine(tools: ToolRegistry, agents: Arc<ScriptedAgents>) -> PlanRunEngine {
    PlanRunEngine::new(
        EngineConfig::default(),
        Arc::new(InMemoryStorage::new()),
        tools,
        agents,
    )
}

pub fn fast_wait(max_retries: u32) -> WaitOptions {
    WaitOptions {
        max_retries,
        backoff_start: Duration::ZERO,
        backoff_step: Duration::from_millis(1),
    }
}
