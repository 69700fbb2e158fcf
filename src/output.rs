use crate::clarification::Clarification;
use crate::shared::ids::PlanRunId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control-relevant classification of an output. Two outputs are
/// interchangeable for the engine when their kinds match, regardless of
/// whether one of them has been offloaded to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Value,
    Clarifications,
    Skipped,
    Completed,
    Error,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputKind::Value => write!(f, "value"),
            OutputKind::Clarifications => write!(f, "clarifications"),
            OutputKind::Skipped => write!(f, "skipped"),
            OutputKind::Completed => write!(f, "completed"),
            OutputKind::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum OutputValue {
    Value(Value),
    Clarifications(Vec<Clarification>),
    Skipped,
    Completed,
    Error(String),
}

impl OutputValue {
    pub fn kind(&self) -> OutputKind {
        match self {
            OutputValue::Value(_) => OutputKind::Value,
            OutputValue::Clarifications(_) => OutputKind::Clarifications,
            OutputValue::Skipped => OutputKind::Skipped,
            OutputValue::Completed => OutputKind::Completed,
            OutputValue::Error(_) => OutputKind::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalOutput {
    pub value: OutputValue,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Reference to an output whose value lives in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffloadedOutput {
    pub plan_run_id: PlanRunId,
    pub output_key: String,
    pub kind: OutputKind,
    #[serde(default)]
    pub summary: Option<String>,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "storage", rename_all = "snake_case")]
pub enum Output {
    Local(LocalOutput),
    Offloaded(OffloadedOutput),
}

impl Output {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::local(OutputValue::Value(value.into()), None)
    }

    pub fn value_with_summary(value: impl Into<Value>, summary: impl Into<String>) -> Self {
        Self::local(OutputValue::Value(value.into()), Some(summary.into()))
    }

    pub fn clarification(clarification: Clarification) -> Self {
        Self::clarifications(vec![clarification])
    }

    pub fn clarifications(clarifications: Vec<Clarification>) -> Self {
        Self::local(OutputValue::Clarifications(clarifications), None)
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::local(OutputValue::Skipped, Some(reason.into()))
    }

    pub fn completed(reason: impl Into<String>) -> Self {
        Self::local(OutputValue::Completed, Some(reason.into()))
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::local(OutputValue::Error(message.clone()), Some(message))
    }

    fn local(value: OutputValue, summary: Option<String>) -> Self {
        Output::Local(LocalOutput { value, summary })
    }

    pub fn kind(&self) -> OutputKind {
        match self {
            Output::Local(local) => local.value.kind(),
            Output::Offloaded(reference) => reference.kind,
        }
    }

    pub fn same_kind(&self, other: &Output) -> bool {
        self.kind() == other.kind()
    }

    pub fn summary(&self) -> Option<&str> {
        match self {
            Output::Local(local) => local.summary.as_deref(),
            Output::Offloaded(reference) => reference.summary.as_deref(),
        }
    }

    /// `Some` only for locally held outputs.
    pub fn local_value(&self) -> Option<&OutputValue> {
        match self {
            Output::Local(local) => Some(&local.value),
            Output::Offloaded(_) => None,
        }
    }

    pub fn raw_value(&self) -> Option<&Value> {
        match self.local_value() {
            Some(OutputValue::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn is_offloaded(&self) -> bool {
        matches!(self, Output::Offloaded(_))
    }

    /// Outputs produced by actually running a step, as opposed to the skip and
    /// early-completion sentinels or a pause.
    pub fn is_real(&self) -> bool {
        self.kind() == OutputKind::Value
    }

    pub fn clarifications_raised(&self) -> &[Clarification] {
        match self.local_value() {
            Some(OutputValue::Clarifications(clarifications)) => clarifications,
            _ => &[],
        }
    }

    pub fn clarifications_raised_mut(&mut self) -> Option<&mut Vec<Clarification>> {
        match self {
            Output::Local(LocalOutput {
                value: OutputValue::Clarifications(clarifications),
                ..
            }) => Some(clarifications),
            _ => None,
        }
    }

    /// Byte length of the serialized value, used for the offload threshold.
    pub fn serialized_len(&self) -> usize {
        match self {
            Output::Local(local) => serde_json::to_vec(&local.value)
                .map(|bytes| bytes.len())
                .unwrap_or(0),
            Output::Offloaded(reference) => reference.size_bytes,
        }
    }
}
