use crate::shared::ids::{ClarificationId, PlanRunId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClarificationCategory {
    /// An external action (usually authorization) must be completed.
    Action,
    Input,
    MultipleChoice,
    ValueConfirmation,
    UserVerification,
    Custom,
}

impl std::fmt::Display for ClarificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClarificationCategory::Action => write!(f, "ACTION"),
            ClarificationCategory::Input => write!(f, "INPUT"),
            ClarificationCategory::MultipleChoice => write!(f, "MULTIPLE_CHOICE"),
            ClarificationCategory::ValueConfirmation => write!(f, "VALUE_CONFIRMATION"),
            ClarificationCategory::UserVerification => write!(f, "USER_VERIFICATION"),
            ClarificationCategory::Custom => write!(f, "CUSTOM"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clarification {
    pub id: ClarificationId,
    pub category: ClarificationCategory,
    pub plan_run_id: PlanRunId,
    /// Step index the clarification was raised at. Assigned by the engine.
    #[serde(default)]
    pub step: Option<usize>,
    pub user_guidance: String,
    #[serde(default)]
    pub argument_name: Option<String>,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub options: Vec<Value>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub source: Option<String>,
}

impl Clarification {
    pub fn new(
        category: ClarificationCategory,
        plan_run_id: PlanRunId,
        user_guidance: impl Into<String>,
    ) -> Self {
        Self {
            id: ClarificationId::generate(),
            category,
            plan_run_id,
            step: None,
            user_guidance: user_guidance.into(),
            argument_name: None,
            action_url: None,
            options: Vec::new(),
            resolved: false,
            response: None,
            source: None,
        }
    }

    pub fn action(
        plan_run_id: PlanRunId,
        user_guidance: impl Into<String>,
        action_url: impl Into<String>,
    ) -> Self {
        let mut clarification =
            Self::new(ClarificationCategory::Action, plan_run_id, user_guidance);
        clarification.action_url = Some(action_url.into());
        clarification
    }

    pub fn input(
        plan_run_id: PlanRunId,
        user_guidance: impl Into<String>,
        argument_name: impl Into<String>,
    ) -> Self {
        let mut clarification =
            Self::new(ClarificationCategory::Input, plan_run_id, user_guidance);
        clarification.argument_name = Some(argument_name.into());
        clarification
    }

    pub fn with_id(mut self, id: ClarificationId) -> Self {
        self.id = id;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_options(mut self, options: Vec<Value>) -> Self {
        self.options = options;
        self
    }

    pub fn is_outstanding(&self) -> bool {
        !self.resolved
    }

    pub fn resolve(&mut self, response: Value) {
        self.resolved = true;
        self.response = Some(response);
    }
}
