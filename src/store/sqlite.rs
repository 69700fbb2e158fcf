use super::{offloaded_reference, PlanRunStore, PlanStore, StoreError};
use crate::output::{OffloadedOutput, Output};
use crate::plan::Plan;
use crate::plan_run::PlanRun;
use crate::shared::ids::{PlanId, PlanRunId};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

pub const DATABASE_FILE_NAME: &str = "runwright.sqlite3";

/// SQLite-backed storage. Each call opens its own connection, so one value can be
/// shared between threads driving different runs.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    db_path: PathBuf,
}

impl SqliteStorage {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let storage = Self {
            db_path: db_path.to_path_buf(),
        };
        storage.ensure_schema()?;
        Ok(storage)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS plans (
                    plan_id TEXT PRIMARY KEY NOT NULL,
                    body TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS plan_runs (
                    run_id TEXT PRIMARY KEY NOT NULL,
                    plan_id TEXT NOT NULL,
                    state TEXT NOT NULL,
                    current_step_index INTEGER NOT NULL,
                    body TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS large_outputs (
                    run_id TEXT NOT NULL,
                    output_key TEXT NOT NULL,
                    body TEXT NOT NULL,
                    PRIMARY KEY (run_id, output_key)
                );

                CREATE INDEX IF NOT EXISTS idx_plan_runs_plan ON plan_runs(plan_id);
                ",
            )
            .map_err(|source| StoreError::Sql { source })
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let connection = Connection::open(&self.db_path).map_err(|source| StoreError::Open {
            path: self.db_path.display().to_string(),
            source,
        })?;
        connection
            .execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|source| StoreError::Sql { source })?;
        Ok(connection)
    }

    fn load_body(&self, sql: &str, key: &[&str]) -> Result<Option<String>, StoreError> {
        let connection = self.connect()?;
        connection
            .query_row(sql, rusqlite::params_from_iter(key.iter()), |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .map_err(|source| StoreError::Sql { source })
    }
}

/// `<table>/<key>`, names the row in encode and decode errors.
fn row_label(table: &str, key: &str) -> String {
    format!("{table}/{key}")
}

fn encode<T: serde::Serialize>(label: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Json {
        path: label.to_string(),
        source,
    })
}

fn decode<T: serde::de::DeserializeOwned>(label: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Json {
        path: label.to_string(),
        source,
    })
}

impl PlanStore for SqliteStorage {
    fn save_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let body = encode(&row_label("plans", plan.id.as_str()), plan)?;
        let connection = self.connect()?;
        connection
            .execute(
                "
                INSERT INTO plans (plan_id, body) VALUES (?1, ?2)
                ON CONFLICT(plan_id) DO UPDATE SET body=excluded.body
                ",
                params![plan.id.as_str(), body],
            )
            .map_err(|source| StoreError::Sql { source })?;
        Ok(())
    }

    fn get_plan(&self, plan_id: &PlanId) -> Result<Plan, StoreError> {
        let raw = self
            .load_body("SELECT body FROM plans WHERE plan_id = ?1", &[plan_id.as_str()])?
            .ok_or_else(|| StoreError::PlanNotFound {
                plan_id: plan_id.to_string(),
            })?;
        decode(&row_label("plans", plan_id.as_str()), &raw)
    }

    fn plan_exists(&self, plan_id: &PlanId) -> Result<bool, StoreError> {
        Ok(self
            .load_body("SELECT plan_id FROM plans WHERE plan_id = ?1", &[plan_id.as_str()])?
            .is_some())
    }
}

impl PlanRunStore for SqliteStorage {
    fn save_plan_run(&self, run: &PlanRun) -> Result<(), StoreError> {
        let body = encode(&row_label("plan_runs", run.id.as_str()), run)?;
        let connection = self.connect()?;
        connection
            .execute(
                "
                INSERT INTO plan_runs (run_id, plan_id, state, current_step_index, body, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(run_id) DO UPDATE SET
                    state=excluded.state,
                    current_step_index=excluded.current_step_index,
                    body=excluded.body,
                    updated_at=excluded.updated_at
                ",
                params![
                    run.id.as_str(),
                    run.plan_id.as_str(),
                    run.state.to_string(),
                    run.current_step_index as i64,
                    body,
                    run.updated_at,
                ],
            )
            .map_err(|source| StoreError::Sql { source })?;
        Ok(())
    }

    fn get_plan_run(&self, run_id: &PlanRunId) -> Result<PlanRun, StoreError> {
        let raw = self
            .load_body(
                "SELECT body FROM plan_runs WHERE run_id = ?1",
                &[run_id.as_str()],
            )?
            .ok_or_else(|| StoreError::PlanRunNotFound {
                run_id: run_id.to_string(),
            })?;
        decode(&row_label("plan_runs", run_id.as_str()), &raw)
    }

    fn save_large_output(
        &self,
        output_key: &str,
        output: &Output,
        run_id: &PlanRunId,
    ) -> Result<Output, StoreError> {
        let body = encode(&row_label("large_outputs", output_key), output)?;
        let connection = self.connect()?;
        connection
            .execute(
                "
                INSERT INTO large_outputs (run_id, output_key, body) VALUES (?1, ?2, ?3)
                ON CONFLICT(run_id, output_key) DO UPDATE SET body=excluded.body
                ",
                params![run_id.as_str(), output_key, body],
            )
            .map_err(|source| StoreError::Sql { source })?;
        Ok(offloaded_reference(output_key, output, run_id))
    }

    fn get_large_output(&self, reference: &OffloadedOutput) -> Result<Output, StoreError> {
        let raw = self
            .load_body(
                "SELECT body FROM large_outputs WHERE run_id = ?1 AND output_key = ?2",
                &[reference.plan_run_id.as_str(), reference.output_key.as_str()],
            )?
            .ok_or_else(|| StoreError::LargeOutputNotFound {
                run_id: reference.plan_run_id.to_string(),
                output_key: reference.output_key.clone(),
            })?;
        decode(&row_label("large_outputs", &reference.output_key), &raw)
    }
}
