use crate::clarification::{Clarification, ClarificationCategory};
use crate::orchestration::agents::{select_agent_kind, AgentContext};
use crate::orchestration::engine::PlanRunEngine;
use crate::orchestration::error::{EngineError, StepError};
use crate::orchestration::hooks::BeforeStepOutcome;
use crate::orchestration::introspection::{PreStepIntrospection, PreStepIntrospectionOutcome};
use crate::output::Output;
use crate::plan::{Plan, Step};
use crate::plan_run::{PlanRun, PlanRunState};
use crate::shared::logging::LogLevel;
use crate::tool::{Tool, ToolFamily};
use std::sync::Arc;

enum StepFlow {
    Next,
    Return,
}

impl PlanRunEngine {
    /// Executes steps from the run's current index until the run completes,
    /// fails or pauses for clarifications.
    pub fn execute_plan_run(&self, plan: &Plan, mut run: PlanRun) -> Result<PlanRun, EngineError> {
        if run.state.is_terminal() {
            return Err(EngineError::InvalidPlanRunState {
                run_id: run.id.to_string(),
                state: run.state,
                operation: "execute".to_string(),
            });
        }
        self.set_state(&mut run, PlanRunState::InProgress)?;
        if run.current_step_index == 0 {
            self.hooks.before_plan_run(plan, &run);
        }

        let mut last_output = self.last_executed_step_output(plan, &run)?;
        for index in run.current_step_index..plan.steps.len() {
            let step = &plan.steps[index];
            run.current_step_index = index;

            if self.interrupted() {
                self.fail_interrupted(&mut run)?;
                return Ok(run);
            }

            match self.run_step(plan, &mut run, step, index, &mut last_output)? {
                StepFlow::Next => continue,
                StepFlow::Return => return Ok(run),
            }
        }

        self.complete_run(plan, &mut run, last_output.as_ref())?;
        Ok(run)
    }

    fn run_step(
        &self,
        plan: &Plan,
        run: &mut PlanRun,
        step: &Step,
        index: usize,
        last_output: &mut Option<Output>,
    ) -> Result<StepFlow, EngineError> {
        let executed = match self.introspect_step(plan, run, step, index) {
            Ok(introspection) => match introspection.outcome {
                PreStepIntrospectionOutcome::Continue => self.execute_step(plan, run, step, index),
                PreStepIntrospectionOutcome::Skip => {
                    self.set_step_output(run, step, Output::skipped(introspection.reason))?;
                    return Ok(StepFlow::Next);
                }
                PreStepIntrospectionOutcome::Complete => {
                    self.set_step_output(run, step, Output::completed(introspection.reason))?;
                    self.complete_run(plan, run, last_output.as_ref())?;
                    return Ok(StepFlow::Return);
                }
            },
            Err(err) => Err(err),
        };

        let mut output = match executed {
            Ok(Some(output)) => output,
            Ok(None) => return Ok(StepFlow::Next),
            Err(err) => {
                self.fail_step(plan, run, step, index, err)?;
                return Ok(StepFlow::Return);
            }
        };

        let mut raised: Vec<Clarification> = Vec::new();
        if let Some(clarifications) = output.clarifications_raised_mut() {
            for clarification in clarifications.iter_mut() {
                clarification.step = Some(index);
            }
            raised = clarifications.clone();
        }
        if output.is_real() {
            *last_output = Some(output.clone());
        }
        self.log(
            LogLevel::Info,
            "step_output",
            format!(
                "run_id={} step_index={index} output_key={} kind={} summary={}",
                run.id,
                step.output,
                output.kind(),
                output.summary().unwrap_or("-")
            ),
        );
        self.set_step_output(run, step, output.clone())?;

        if !raised.is_empty() {
            let pending = self.clarifications_after_step(plan, run, step, index, raised)?;
            self.raise_clarifications(run, pending)?;
            return Ok(StepFlow::Return);
        }

        self.hooks.after_step_execution(plan, run, step, &output);
        self.save_run(run)?;
        Ok(StepFlow::Next)
    }

    fn introspect_step(
        &self,
        plan: &Plan,
        run: &PlanRun,
        step: &Step,
        index: usize,
    ) -> Result<PreStepIntrospection, StepError> {
        let Some(condition) = step.condition.as_deref() else {
            return Ok(PreStepIntrospection::new(
                PreStepIntrospectionOutcome::Continue,
                "no condition to evaluate",
            ));
        };
        let introspection = self.introspection.pre_step_introspection(plan, run)?;
        self.log(
            LogLevel::Info,
            "step_condition",
            format!(
                "run_id={} step_index={index} condition={condition:?} outcome={:?} reason={}",
                run.id, introspection.outcome, introspection.reason
            ),
        );
        Ok(introspection)
    }

    /// `Ok(None)` when the before-step hook bypassed the step.
    fn execute_step(
        &self,
        plan: &Plan,
        run: &PlanRun,
        step: &Step,
        index: usize,
    ) -> Result<Option<Output>, StepError> {
        // A step that already raised clarifications is being re-executed; the hook saw it once.
        if run.clarifications_for_step(Some(index)).is_empty()
            && self.hooks.before_step_execution(plan, run, step) == BeforeStepOutcome::Skip
        {
            self.log(
                LogLevel::Info,
                "step_bypassed",
                format!("run_id={} step_index={index}", run.id),
            );
            return Ok(None);
        }

        let tool = self.tool_for_step(step)?;
        let kind = select_agent_kind(self.config.execution_agent_type, tool.as_deref());
        self.log(
            LogLevel::Info,
            "step_started",
            format!(
                "run_id={} step_index={index} tool_id={} agent={kind} task={:?}",
                run.id,
                step.tool_id.as_deref().unwrap_or("-"),
                step.task
            ),
        );
        let mut agent = self.agents.build(
            kind,
            AgentContext {
                plan,
                plan_run: run,
                step,
                step_index: index,
                tool,
                end_user_id: &run.end_user_id,
                config: &self.config,
            },
        )?;
        let output = agent.execute_sync()?;
        Ok(Some(output))
    }

    pub(crate) fn tool_for_step(&self, step: &Step) -> Result<Option<Arc<dyn Tool>>, StepError> {
        match step.tool_id.as_deref() {
            None => Ok(None),
            Some(tool_id) => Ok(Some(self.tools.get_tool(tool_id)?)),
        }
    }

    /// Clarifications to raise after a step returned `raised`.
    ///
    /// A lone ACTION from a remote tool may mean the tool itself is not ready, so
    /// the gate is re-run over the closed range starting at this step. Otherwise
    /// only later steps are re-checked. The gate's answer is merged with
    /// `raised`, first occurrence of an id wins.
    fn clarifications_after_step(
        &self,
        plan: &Plan,
        run: &PlanRun,
        step: &Step,
        index: usize,
        raised: Vec<Clarification>,
    ) -> Result<Vec<Clarification>, EngineError> {
        let remote_action = raised.len() == 1
            && raised[0].category == ClarificationCategory::Action
            && step
                .tool_id
                .as_deref()
                .and_then(|tool_id| self.tools.get_tool(tool_id).ok())
                .map(|tool| tool.family() == ToolFamily::Remote)
                .unwrap_or(false);
        let gate_from = if remote_action { index } else { index + 1 };
        let gate = self.check_readiness(plan, run, gate_from)?;

        let mut combined: Vec<Clarification> = Vec::with_capacity(raised.len() + gate.len());
        for clarification in raised.into_iter().chain(gate) {
            if combined.iter().all(|known| known.id != clarification.id) {
                combined.push(clarification);
            }
        }
        Ok(combined)
    }

    /// Records `output` under the step's key, offloading it first when it is too large.
    fn set_step_output(
        &self,
        run: &mut PlanRun,
        step: &Step,
        output: Output,
    ) -> Result<(), EngineError> {
        let output = if output.is_real()
            && self
                .config
                .exceeds_output_threshold(output.serialized_len())
        {
            let reference = self
                .storage
                .save_large_output(&step.output, &output, &run.id)?;
            self.log(
                LogLevel::Debug,
                "step_output_offloaded",
                format!(
                    "run_id={} output_key={} size_bytes={}",
                    run.id,
                    step.output,
                    output.serialized_len()
                ),
            );
            reference
        } else {
            output
        };
        run.outputs.step_outputs.insert(step.output.clone(), output);
        self.save_run(run)
    }

    fn fail_step(
        &self,
        plan: &Plan,
        run: &mut PlanRun,
        step: &Step,
        index: usize,
        err: StepError,
    ) -> Result<(), EngineError> {
        self.log(
            LogLevel::Error,
            "step_failed",
            format!(
                "run_id={} step_index={index} transition=failed error={err}",
                run.id
            ),
        );
        let error_output = Output::error(err.to_string());
        self.set_step_output(run, step, error_output.clone())?;
        run.outputs.final_output = Some(error_output.clone());
        self.set_state(run, PlanRunState::Failed)?;
        self.hooks
            .after_step_execution(plan, run, step, &error_output);
        self.hooks.after_plan_run(plan, run, &error_output);
        Ok(())
    }

    fn complete_run(
        &self,
        plan: &Plan,
        run: &mut PlanRun,
        last_output: Option<&Output>,
    ) -> Result<(), EngineError> {
        let final_output = self.assemble_final_output(plan, run, last_output)?;
        run.outputs.final_output = Some(final_output.clone());
        self.set_state(run, PlanRunState::Complete)?;
        self.log(
            LogLevel::Info,
            "plan_run_complete",
            format!(
                "run_id={} steps={} final_kind={} summary={}",
                run.id,
                run.outputs.step_outputs.len(),
                final_output.kind(),
                final_output.summary().unwrap_or("-")
            ),
        );
        self.hooks.after_plan_run(plan, run, &final_output);
        Ok(())
    }
}
