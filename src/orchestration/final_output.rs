use crate::orchestration::engine::PlanRunEngine;
use crate::orchestration::error::EngineError;
use crate::orchestration::summarizer::FinalSummary;
use crate::output::{LocalOutput, Output, OutputValue};
use crate::plan::Plan;
use crate::plan_run::PlanRun;
use crate::shared::logging::LogLevel;
use serde_json::Value;

pub const NO_OUTPUT_REASON: &str = "no step produced a value";

impl PlanRunEngine {
    /// Output of the most recent step at or before the current index that actually
    /// produced a value. Offloaded outputs are loaded back from the store.
    pub fn last_executed_step_output(
        &self,
        plan: &Plan,
        run: &PlanRun,
    ) -> Result<Option<Output>, EngineError> {
        let upper = run.current_step_index.min(plan.steps.len().saturating_sub(1));
        for step in plan.steps.iter().take(upper + 1).rev() {
            let Some(output) = run.step_output(&step.output) else {
                continue;
            };
            if !output.is_real() {
                continue;
            }
            return match output {
                Output::Offloaded(reference) => Ok(Some(self.storage.get_large_output(reference)?)),
                Output::Local(_) => Ok(Some(output.clone())),
            };
        }
        Ok(None)
    }

    /// Builds the run's final output from its last real step output.
    ///
    /// The summarizer is best effort: its failures are logged and the raw value
    /// is kept. A structured replacement is only accepted when it validates
    /// against the run's output schema.
    pub fn assemble_final_output(
        &self,
        plan: &Plan,
        run: &PlanRun,
        last_output: Option<&Output>,
    ) -> Result<Output, EngineError> {
        let Some(last_output) = last_output else {
            return Ok(Output::completed(NO_OUTPUT_REASON));
        };
        let materialized;
        let source = match last_output {
            Output::Offloaded(reference) => {
                materialized = self.storage.get_large_output(reference)?;
                &materialized
            }
            Output::Local(_) => last_output,
        };
        let mut value = source.raw_value().cloned().unwrap_or(Value::Null);
        let mut summary = None;

        match self.summarizer.create_summary(plan, run) {
            Ok(None) => {}
            Ok(Some(FinalSummary::Text(text))) => summary = Some(text),
            Ok(Some(FinalSummary::Structured {
                value: structured,
                summary: text,
            })) => {
                match self.check_structured_output(run, &structured) {
                    Ok(()) => value = structured,
                    Err(reason) => self.log(
                        LogLevel::Warn,
                        "final_output_schema",
                        format!("run_id={} accepted=false reason={reason}", run.id),
                    ),
                }
                summary = Some(text);
            }
            Err(err) => self.log(
                LogLevel::Warn,
                "final_output_summary",
                format!("run_id={} error={err}", run.id),
            ),
        }

        Ok(Output::Local(LocalOutput {
            value: OutputValue::Value(value),
            summary,
        }))
    }

    fn check_structured_output(&self, run: &PlanRun, candidate: &Value) -> Result<(), String> {
        let Some(schema) = run.structured_output_schema.as_ref() else {
            return Err("plan run has no structured output schema".to_string());
        };
        let validator = jsonschema::validator_for(schema)
            .map_err(|err| format!("invalid output schema: {err}"))?;
        let messages: Vec<String> = validator
            .iter_errors(candidate)
            .map(|err| err.to_string())
            .collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages.join("; "))
        }
    }
}
