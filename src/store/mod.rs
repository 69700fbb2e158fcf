//! Persistence for plans, plan runs and offloaded outputs.
//!
//! The engine only talks to the [`Storage`] traits; [`open_storage`] picks a
//! backend from configuration.

pub mod disk;
pub mod memory;
pub mod sqlite;

pub use disk::DiskFileStorage;
pub use memory::InMemoryStorage;
pub use sqlite::SqliteStorage;

use crate::config::{StorageClass, StorageConfig};
use crate::output::{OffloadedOutput, Output};
use crate::plan::Plan;
use crate::plan_run::PlanRun;
use crate::shared::ids::{PlanId, PlanRunId};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("plan `{plan_id}` not found")]
    PlanNotFound { plan_id: String },
    #[error("plan run `{run_id}` not found")]
    PlanRunNotFound { run_id: String },
    #[error("large output `{output_key}` for plan run `{run_id}` not found")]
    LargeOutputNotFound { run_id: String, output_key: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
    #[error("storage configuration invalid: {0}")]
    Config(String),
    #[error("storage lock poisoned")]
    LockPoisoned,
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

pub(crate) fn json_error(path: &Path, source: serde_json::Error) -> StoreError {
    StoreError::Json {
        path: path.display().to_string(),
        source,
    }
}

pub trait PlanStore: Send + Sync {
    fn save_plan(&self, plan: &Plan) -> Result<(), StoreError>;
    fn get_plan(&self, plan_id: &PlanId) -> Result<Plan, StoreError>;
    fn plan_exists(&self, plan_id: &PlanId) -> Result<bool, StoreError>;
}

pub trait PlanRunStore: Send + Sync {
    fn save_plan_run(&self, run: &PlanRun) -> Result<(), StoreError>;
    fn get_plan_run(&self, run_id: &PlanRunId) -> Result<PlanRun, StoreError>;

    /// Stores `output` out of line and returns the reference that replaces it in the run.
    fn save_large_output(
        &self,
        output_key: &str,
        output: &Output,
        run_id: &PlanRunId,
    ) -> Result<Output, StoreError>;

    fn get_large_output(&self, reference: &OffloadedOutput) -> Result<Output, StoreError>;
}

pub trait Storage: PlanStore + PlanRunStore {}

impl<T: PlanStore + PlanRunStore> Storage for T {}

pub fn open_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>, StoreError> {
    let dir = || {
        config.dir.as_deref().ok_or_else(|| {
            StoreError::Config(format!(
                "storage class `{}` needs a `dir`",
                config.class.as_str()
            ))
        })
    };
    match config.class {
        StorageClass::Memory => Ok(Arc::new(InMemoryStorage::new())),
        StorageClass::Disk => Ok(Arc::new(DiskFileStorage::new(dir()?))),
        StorageClass::Sqlite => Ok(Arc::new(SqliteStorage::open(
            &dir()?.join(sqlite::DATABASE_FILE_NAME),
        )?)),
    }
}

/// Builds the reference stored in the run in place of an offloaded output.
pub(crate) fn offloaded_reference(
    output_key: &str,
    output: &Output,
    run_id: &PlanRunId,
) -> Output {
    Output::Offloaded(OffloadedOutput {
        plan_run_id: run_id.clone(),
        output_key: output_key.to_string(),
        kind: output.kind(),
        summary: output.summary().map(str::to_string),
        size_bytes: output.serialized_len(),
    })
}
