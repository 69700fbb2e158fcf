use crate::shared::ids::PlanId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl PlanInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanContext {
    pub query: String,
    #[serde(default)]
    pub tool_ids: Vec<String>,
}

/// A named reference from a step to an earlier output or a plan input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub task: String,
    #[serde(default)]
    pub tool_id: Option<String>,
    /// Guard evaluated by the introspection agent before the step runs.
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub inputs: Vec<StepInput>,
    /// Key the step's result is recorded under.
    pub output: String,
}

impl Step {
    pub fn new(task: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            tool_id: None,
            condition: None,
            inputs: Vec::new(),
            output: output.into(),
        }
    }

    pub fn with_tool(mut self, tool_id: impl Into<String>) -> Self {
        self.tool_id = Some(tool_id.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(StepInput {
            name: name.into(),
            description: None,
        });
        self
    }
}

/// Immutable once created; the engine only ever reads plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    #[serde(default)]
    pub plan_context: PlanContext,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub plan_inputs: Vec<PlanInput>,
    #[serde(default)]
    pub structured_output_schema: Option<Value>,
}

impl Plan {
    pub fn new(query: impl Into<String>, steps: Vec<Step>) -> Self {
        let mut tool_ids: Vec<String> = Vec::new();
        for tool_id in steps.iter().filter_map(|step| step.tool_id.as_ref()) {
            if !tool_ids.contains(tool_id) {
                tool_ids.push(tool_id.clone());
            }
        }
        Self {
            id: PlanId::generate(),
            plan_context: PlanContext {
                query: query.into(),
                tool_ids,
            },
            steps,
            plan_inputs: Vec::new(),
            structured_output_schema: None,
        }
    }

    pub fn with_id(mut self, id: PlanId) -> Self {
        self.id = id;
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<PlanInput>) -> Self {
        self.plan_inputs = inputs;
        self
    }

    pub fn with_structured_output_schema(mut self, schema: Value) -> Self {
        self.structured_output_schema = Some(schema);
        self
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }
}
