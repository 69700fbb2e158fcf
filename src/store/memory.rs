use super::{offloaded_reference, PlanRunStore, PlanStore, StoreError};
use crate::output::{OffloadedOutput, Output};
use crate::plan::Plan;
use crate::plan_run::PlanRun;
use crate::shared::ids::{PlanId, PlanRunId};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    plans: BTreeMap<PlanId, Plan>,
    runs: BTreeMap<PlanRunId, PlanRun>,
    large_outputs: BTreeMap<(PlanRunId, String), Output>,
}

/// Process-local storage. Contents are lost when the value is dropped.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: Mutex<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl PlanStore for InMemoryStorage {
    fn save_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        self.lock()?.plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    fn get_plan(&self, plan_id: &PlanId) -> Result<Plan, StoreError> {
        self.lock()?
            .plans
            .get(plan_id)
            .cloned()
            .ok_or_else(|| StoreError::PlanNotFound {
                plan_id: plan_id.to_string(),
            })
    }

    fn plan_exists(&self, plan_id: &PlanId) -> Result<bool, StoreError> {
        Ok(self.lock()?.plans.contains_key(plan_id))
    }
}

impl PlanRunStore for InMemoryStorage {
    fn save_plan_run(&self, run: &PlanRun) -> Result<(), StoreError> {
        self.lock()?.runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    fn get_plan_run(&self, run_id: &PlanRunId) -> Result<PlanRun, StoreError> {
        self.lock()?
            .runs
            .get(run_id)
            .cloned()
            .ok_or_else(|| StoreError::PlanRunNotFound {
                run_id: run_id.to_string(),
            })
    }

    fn save_large_output(
        &self,
        output_key: &str,
        output: &Output,
        run_id: &PlanRunId,
    ) -> Result<Output, StoreError> {
        self.lock()?
            .large_outputs
            .insert((run_id.clone(), output_key.to_string()), output.clone());
        Ok(offloaded_reference(output_key, output, run_id))
    }

    fn get_large_output(&self, reference: &OffloadedOutput) -> Result<Output, StoreError> {
        self.lock()?
            .large_outputs
            .get(&(reference.plan_run_id.clone(), reference.output_key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::LargeOutputNotFound {
                run_id: reference.plan_run_id.to_string(),
                output_key: reference.output_key.clone(),
            })
    }
}
