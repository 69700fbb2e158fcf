use crate::clarification::Clarification;
use crate::output::Output;
use crate::shared::ids::{ClarificationId, PlanId, PlanRunId};
use crate::shared::time::now_secs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanRunState {
    NotStarted,
    InProgress,
    NeedClarification,
    ReadyToResume,
    Complete,
    Failed,
}

impl PlanRunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PlanRunState::Complete | PlanRunState::Failed)
    }

    /// States a run may be resumed (or waited on) from.
    pub fn is_resumable(self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next != PlanRunState::NotStarted || self == PlanRunState::NotStarted
    }
}

impl std::fmt::Display for PlanRunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanRunState::NotStarted => write!(f, "NOT_STARTED"),
            PlanRunState::InProgress => write!(f, "IN_PROGRESS"),
            PlanRunState::NeedClarification => write!(f, "NEED_CLARIFICATION"),
            PlanRunState::ReadyToResume => write!(f, "READY_TO_RESUME"),
            PlanRunState::Complete => write!(f, "COMPLETE"),
            PlanRunState::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanRunOutputs {
    #[serde(default)]
    pub step_outputs: BTreeMap<String, Output>,
    #[serde(default)]
    pub clarifications: Vec<Clarification>,
    #[serde(default)]
    pub final_output: Option<Output>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRun {
    pub id: PlanRunId,
    pub plan_id: PlanId,
    pub state: PlanRunState,
    #[serde(default)]
    pub current_step_index: usize,
    pub end_user_id: String,
    #[serde(default)]
    pub plan_run_inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub outputs: PlanRunOutputs,
    #[serde(default)]
    pub structured_output_schema: Option<Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PlanRun {
    pub fn new(plan_id: PlanId, end_user_id: impl Into<String>) -> Self {
        let now = now_secs();
        Self {
            id: PlanRunId::generate(),
            plan_id,
            state: PlanRunState::NotStarted,
            current_step_index: 0,
            end_user_id: end_user_id.into(),
            plan_run_inputs: BTreeMap::new(),
            outputs: PlanRunOutputs::default(),
            structured_output_schema: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn outstanding_clarifications(&self) -> Vec<Clarification> {
        self.outputs
            .clarifications
            .iter()
            .filter(|clarification| clarification.is_outstanding())
            .cloned()
            .collect()
    }

    pub fn has_outstanding_clarifications(&self) -> bool {
        self.outputs
            .clarifications
            .iter()
            .any(Clarification::is_outstanding)
    }

    /// Clarifications tagged with `step`, or with the current step when `None`.
    pub fn clarifications_for_step(&self, step: Option<usize>) -> Vec<Clarification> {
        let step = step.unwrap_or(self.current_step_index);
        self.outputs
            .clarifications
            .iter()
            .filter(|clarification| clarification.step == Some(step))
            .cloned()
            .collect()
    }

    /// Appends clarifications whose id is not yet recorded. Returns how many were added.
    pub fn append_clarifications(
        &mut self,
        clarifications: impl IntoIterator<Item = Clarification>,
    ) -> usize {
        let mut added = 0;
        for clarification in clarifications {
            if self.find_clarification(&clarification.id).is_some() {
                continue;
            }
            self.outputs.clarifications.push(clarification);
            added += 1;
        }
        added
    }

    pub fn find_clarification(&self, id: &ClarificationId) -> Option<&Clarification> {
        self.outputs
            .clarifications
            .iter()
            .find(|clarification| &clarification.id == id)
    }

    pub fn find_clarification_mut(&mut self, id: &ClarificationId) -> Option<&mut Clarification> {
        self.outputs
            .clarifications
            .iter_mut()
            .find(|clarification| &clarification.id == id)
    }

    pub fn step_output(&self, output_key: &str) -> Option<&Output> {
        self.outputs.step_outputs.get(output_key)
    }
}
