use crate::clarification::{Clarification, ClarificationCategory};
use crate::config::WaitConfig;
use crate::orchestration::engine::PlanRunEngine;
use crate::orchestration::error::EngineError;
use crate::orchestration::hooks::ClarificationResolution;
use crate::plan::Plan;
use crate::plan_run::{PlanRun, PlanRunState};
use crate::shared::ids::{ClarificationId, PlanRunId};
use crate::shared::logging::LogLevel;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const INTERRUPT_POLL: Duration = Duration::from_millis(200);

/// Response recorded on ACTION clarifications the wait loop resolves itself.
pub const ACTION_COMPLETE_RESPONSE: &str = "complete";

/// Polling schedule for [`PlanRunEngine::wait_for_ready_with`].
///
/// The loop polls every `backoff_step` until `backoff_start` has elapsed; after
/// that every poll doubles the interval and counts towards `max_retries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub max_retries: u32,
    pub backoff_start: Duration,
    pub backoff_step: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        WaitConfig::default().options()
    }
}

impl PlanRunEngine {
    /// Tags new clarifications with the current step, appends them to the run
    /// (deduplicated by id) and pauses the run.
    pub(crate) fn raise_clarifications(
        &self,
        run: &mut PlanRun,
        clarifications: Vec<Clarification>,
    ) -> Result<(), EngineError> {
        let step = run.current_step_index;
        let mut fresh = Vec::with_capacity(clarifications.len());
        for mut clarification in clarifications {
            if run.find_clarification(&clarification.id).is_some() {
                continue;
            }
            clarification.step = Some(step);
            self.log(
                LogLevel::Info,
                "clarification_raised",
                format!(
                    "run_id={} step_index={step} clarification_id={} category={} source={} guidance={:?}",
                    run.id,
                    clarification.id,
                    clarification.category,
                    clarification.source.as_deref().unwrap_or("-"),
                    clarification.user_guidance
                ),
            );
            fresh.push(clarification);
        }
        run.append_clarifications(fresh);
        self.set_state(run, PlanRunState::NeedClarification)
    }

    /// Resolves `clarification` in its stored run. The run becomes
    /// READY_TO_RESUME once nothing is left outstanding.
    pub fn resolve_clarification(
        &self,
        clarification: &Clarification,
        response: Value,
    ) -> Result<PlanRun, EngineError> {
        let mut run = self.storage.get_plan_run(&clarification.plan_run_id)?;
        self.resolve_in_run(&mut run, &clarification.id, response)?;
        Ok(run)
    }

    pub(crate) fn resolve_in_run(
        &self,
        run: &mut PlanRun,
        clarification_id: &ClarificationId,
        response: Value,
    ) -> Result<(), EngineError> {
        if run.state.is_terminal() {
            return Err(EngineError::InvalidPlanRunState {
                run_id: run.id.to_string(),
                state: run.state,
                operation: "resolve a clarification".to_string(),
            });
        }
        let run_id = run.id.to_string();
        let matched = run.find_clarification_mut(clarification_id).ok_or_else(|| {
            EngineError::ClarificationNotFound {
                clarification_id: clarification_id.to_string(),
                run_id: run_id.clone(),
            }
        })?;
        matched.resolve(response);
        self.log(
            LogLevel::Info,
            "clarification_resolved",
            format!("run_id={run_id} clarification_id={clarification_id}"),
        );

        if run.has_outstanding_clarifications() {
            self.save_run(run)
        } else {
            self.set_state(run, PlanRunState::ReadyToResume)
        }
    }

    /// Records that `clarification` could not be resolved. The run fails.
    pub fn error_clarification(
        &self,
        clarification: &Clarification,
        error: &str,
    ) -> Result<PlanRun, EngineError> {
        let mut run = self.storage.get_plan_run(&clarification.plan_run_id)?;
        self.error_in_run(&mut run, clarification, error)?;
        Ok(run)
    }

    pub(crate) fn error_in_run(
        &self,
        run: &mut PlanRun,
        clarification: &Clarification,
        error: &str,
    ) -> Result<(), EngineError> {
        self.log(
            LogLevel::Error,
            "clarification_failed",
            format!(
                "run_id={} clarification_id={} guidance={:?} error={error}",
                run.id, clarification.id, clarification.user_guidance
            ),
        );
        match run.state {
            PlanRunState::Failed => Ok(()),
            PlanRunState::Complete => Err(EngineError::InvalidPlanRunState {
                run_id: run.id.to_string(),
                state: run.state,
                operation: "record a clarification error".to_string(),
            }),
            _ => self.set_state(run, PlanRunState::Failed),
        }
    }

    /// Offers outstanding clarifications to the configured handler, then waits
    /// for the run to become resumable. Without a handler the run is returned as is.
    pub(crate) fn handle_clarifications(
        &self,
        plan: &Plan,
        mut run: PlanRun,
    ) -> Result<PlanRun, EngineError> {
        let Some(handler) = self.hooks.clarification_handler() else {
            return Ok(run);
        };
        let outstanding = run.outstanding_clarifications();
        for clarification in &outstanding {
            match handler.handle(clarification) {
                ClarificationResolution::Resolved(response) => {
                    self.resolve_in_run(&mut run, &clarification.id, response)?;
                }
                ClarificationResolution::Failed(reason) => {
                    self.error_in_run(&mut run, clarification, &reason)?;
                }
                ClarificationResolution::Pending => self.log(
                    LogLevel::Debug,
                    "clarification_pending",
                    format!(
                        "run_id={} plan_id={} clarification_id={}",
                        run.id, plan.id, clarification.id
                    ),
                ),
            }
            if run.state.is_terminal() {
                return Ok(run);
            }
        }
        if outstanding.is_empty() {
            return Ok(run);
        }

        let run_id = run.id.clone();
        match self.wait_for_ready(run) {
            Err(EngineError::WaitInterrupted { .. }) => {
                let mut run = self.storage.get_plan_run(&run_id)?;
                self.fail_interrupted(&mut run)?;
                Ok(run)
            }
            other => other,
        }
    }

    /// [`Self::wait_for_ready_with`] using the configured wait schedule.
    pub fn wait_for_ready(&self, run: PlanRun) -> Result<PlanRun, EngineError> {
        let options = self.config.wait.options();
        self.wait_for_ready_with(run, &options)
    }

    /// Blocks until the run can be resumed, polling the readiness gate.
    ///
    /// Runs that are not waiting on clarifications return immediately. When the
    /// gate reports every tool ready, outstanding ACTION clarifications of the
    /// current step are treated as completed. Fails with `WaitTimeout` after
    /// `max_retries` backoff polls, leaving the run untouched.
    pub fn wait_for_ready_with(
        &self,
        run: PlanRun,
        options: &WaitOptions,
    ) -> Result<PlanRun, EngineError> {
        match run.state {
            PlanRunState::NotStarted | PlanRunState::InProgress | PlanRunState::ReadyToResume => {
                Ok(run)
            }
            PlanRunState::NeedClarification => self.poll_until_ready(run, options),
            PlanRunState::Complete | PlanRunState::Failed => {
                Err(EngineError::InvalidPlanRunState {
                    run_id: run.id.to_string(),
                    state: run.state,
                    operation: "wait for readiness".to_string(),
                })
            }
        }
    }

    fn poll_until_ready(
        &self,
        run: PlanRun,
        options: &WaitOptions,
    ) -> Result<PlanRun, EngineError> {
        let plan = self.storage.get_plan(&run.plan_id)?;
        let run_id = run.id;
        let started = Instant::now();
        let mut tries = 0_u32;
        let mut interval = options.backoff_step;

        let ready = loop {
            let run = self.reload_waiting_run(&run_id)?;
            if run.state == PlanRunState::ReadyToResume {
                break run;
            }
            if tries >= options.max_retries {
                self.log(
                    LogLevel::Warn,
                    "wait_timeout",
                    format!("run_id={run_id} retries={tries}"),
                );
                return Err(EngineError::WaitTimeout {
                    run_id: run_id.to_string(),
                    retries: tries,
                });
            }
            if started.elapsed() > options.backoff_start {
                tries += 1;
                interval = interval.saturating_mul(2);
            }
            if !sleep_unless_interrupted(&self.interrupt, interval) {
                return Err(EngineError::WaitInterrupted {
                    run_id: run_id.to_string(),
                });
            }

            // Resolutions may have landed while sleeping; only write back a fresh copy.
            let mut run = self.reload_waiting_run(&run_id)?;
            if run.state == PlanRunState::ReadyToResume {
                break run;
            }
            let gate = self.check_readiness(&plan, &run, run.current_step_index)?;
            if gate.is_empty() {
                let completed = complete_current_actions(&mut run);
                if !run.has_outstanding_clarifications() {
                    self.set_state(&mut run, PlanRunState::ReadyToResume)?;
                } else if completed > 0 {
                    self.save_run(&mut run)?;
                }
            }
            self.log(
                LogLevel::Debug,
                "wait_poll",
                format!(
                    "run_id={run_id} state={} tries={tries} interval_ms={} gate={}",
                    run.state,
                    interval.as_millis(),
                    gate.len()
                ),
            );
            if run.state == PlanRunState::ReadyToResume {
                break run;
            }
        };

        self.log(
            LogLevel::Info,
            "plan_run_ready",
            format!("run_id={run_id} step_index={}", ready.current_step_index),
        );
        Ok(ready)
    }

    /// Loads the run being waited on. Terminal runs can no longer become ready.
    fn reload_waiting_run(&self, run_id: &PlanRunId) -> Result<PlanRun, EngineError> {
        let run = self.storage.get_plan_run(run_id)?;
        if run.state.is_terminal() {
            return Err(EngineError::InvalidPlanRunState {
                run_id: run.id.to_string(),
                state: run.state,
                operation: "wait for readiness".to_string(),
            });
        }
        Ok(run)
    }
}

fn complete_current_actions(run: &mut PlanRun) -> usize {
    let step = Some(run.current_step_index);
    let mut completed = 0;
    for clarification in run.outputs.clarifications.iter_mut().filter(|clarification| {
        clarification.step == step
            && clarification.category == ClarificationCategory::Action
            && clarification.is_outstanding()
    }) {
        clarification.resolve(Value::String(ACTION_COMPLETE_RESPONSE.to_string()));
        completed += 1;
    }
    completed
}

/// Sleeps for `total`, waking early when `interrupt` is set. Returns `false` if interrupted.
fn sleep_unless_interrupted(interrupt: &AtomicBool, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if interrupt.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(INTERRUPT_POLL));
    }
}
