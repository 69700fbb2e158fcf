use super::{io_error, json_error, offloaded_reference, PlanRunStore, PlanStore, StoreError};
use crate::output::{OffloadedOutput, Output};
use crate::plan::Plan;
use crate::plan_run::PlanRun;
use crate::shared::ids::{to_hex, PlanId, PlanRunId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// JSON documents on the local filesystem:
///
/// ```text
/// <root>/plans/<plan_id>.json
/// <root>/plan_runs/<run_id>.json
/// <root>/outputs/<run_id>/<sha256(output_key)>.json
/// ```
#[derive(Debug, Clone)]
pub struct DiskFileStorage {
    root: PathBuf,
}

impl DiskFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn plan_path(&self, plan_id: &PlanId) -> PathBuf {
        self.root.join("plans").join(format!("{plan_id}.json"))
    }

    fn run_path(&self, run_id: &PlanRunId) -> PathBuf {
        self.root.join("plan_runs").join(format!("{run_id}.json"))
    }

    fn output_path(&self, run_id: &PlanRunId, output_key: &str) -> PathBuf {
        let digest = Sha256::digest(output_key.as_bytes());
        self.root
            .join("outputs")
            .join(run_id.as_str())
            .join(format!("{}.json", to_hex(&digest)))
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let body = serde_json::to_vec_pretty(value).map_err(|e| json_error(path, e))?;
    let parent = path
        .parent()
        .ok_or_else(|| io_error(path, std::io::Error::other("path has no parent")))?;
    fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    replace_file(path, parent, &body).map_err(|e| io_error(path, e))
}

/// Readers never observe a half-written document: the body lands in a fresh
/// sibling staging file, is synced, renamed over the target, and the parent
/// directory is synced so the rename survives a crash.
fn replace_file(path: &Path, parent: &Path, body: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("record");
    let staging = parent.join(format!(
        ".{file_name}.{}.{}.partial",
        std::process::id(),
        TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed)
    ));

    let staged = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&staging)
        .and_then(|mut file| {
            file.write_all(body)?;
            file.sync_all()
        });
    if let Err(err) = staged.and_then(|_| fs::rename(&staging, path)) {
        let _ = fs::remove_file(&staging);
        return Err(err);
    }
    sync_parent_dir(parent)
}

#[cfg(unix)]
fn sync_parent_dir(parent: &Path) -> std::io::Result<()> {
    fs::File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_parent: &Path) -> std::io::Result<()> {
    Ok(())
}

/// `Ok(None)` when the file does not exist.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_error(path, err)),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| json_error(path, e))
}

impl PlanStore for DiskFileStorage {
    fn save_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        write_json(&self.plan_path(&plan.id), plan)
    }

    fn get_plan(&self, plan_id: &PlanId) -> Result<Plan, StoreError> {
        read_json(&self.plan_path(plan_id))?.ok_or_else(|| StoreError::PlanNotFound {
            plan_id: plan_id.to_string(),
        })
    }

    fn plan_exists(&self, plan_id: &PlanId) -> Result<bool, StoreError> {
        Ok(self.plan_path(plan_id).is_file())
    }
}

impl PlanRunStore for DiskFileStorage {
    fn save_plan_run(&self, run: &PlanRun) -> Result<(), StoreError> {
        write_json(&self.run_path(&run.id), run)
    }

    fn get_plan_run(&self, run_id: &PlanRunId) -> Result<PlanRun, StoreError> {
        read_json(&self.run_path(run_id))?.ok_or_else(|| StoreError::PlanRunNotFound {
            run_id: run_id.to_string(),
        })
    }

    fn save_large_output(
        &self,
        output_key: &str,
        output: &Output,
        run_id: &PlanRunId,
    ) -> Result<Output, StoreError> {
        write_json(&self.output_path(run_id, output_key), output)?;
        Ok(offloaded_reference(output_key, output, run_id))
    }

    fn get_large_output(&self, reference: &OffloadedOutput) -> Result<Output, StoreError> {
        let path = self.output_path(&reference.plan_run_id, &reference.output_key);
        read_json(&path)?.ok_or_else(|| StoreError::LargeOutputNotFound {
            run_id: reference.plan_run_id.to_string(),
            output_key: reference.output_key.clone(),
        })
    }
}
