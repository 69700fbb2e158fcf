pub mod clarification;
pub mod config;
pub mod orchestration;
pub mod output;
pub mod plan;
pub mod plan_run;
pub mod shared;
pub mod store;
pub mod tool;

pub use clarification::{Clarification, ClarificationCategory};
pub use config::{EngineConfig, StorageClass, StorageConfig, WaitConfig};
pub use orchestration::{EngineError, PlanRunEngine, StepError, WaitOptions};
pub use output::{Output, OutputKind, OutputValue};
pub use plan::{Plan, PlanInput, Step};
pub use plan_run::{PlanRun, PlanRunState};
pub use shared::ids::{ClarificationId, PlanId, PlanRunId};
pub use store::{InMemoryStorage, Storage, StoreError};
pub use tool::{ReadyResponse, Tool, ToolFamily, ToolRegistry, ToolRunContext};
