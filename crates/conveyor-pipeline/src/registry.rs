//! In-memory job registry
//!
//! Shared between status queries and in-flight pipelines. Creation is an
//! atomic check-and-insert; every mutation runs under the entry's write lock
//! so status checks and updates cannot interleave.

use std::collections::BTreeMap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::job::{Job, JobId};
use crate::stage::Stage;
use crate::Error;

/// Thread-safe map from job identifier to job record
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, Job>,
}

impl JobRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new running job unless the identifier is already known.
    ///
    /// Returns `true` if this call created the job. Two concurrent callers
    /// with the same identifier get exactly one `true`.
    pub fn try_insert(&self, id: &JobId) -> bool {
        match self.jobs.entry(id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Job::new());
                true
            }
        }
    }

    /// Snapshot of one job
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.get(id).map(|job| job.clone())
    }

    /// Snapshot of every job, ordered by identifier
    pub fn list(&self) -> BTreeMap<JobId, Job> {
        self.jobs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Append a finished stage to a running job
    pub fn record_stage(&self, id: &JobId, stage: Stage) -> Result<(), Error> {
        self.update(id, |job| job.record_stage(id, stage))
    }

    /// Move a running job to `Failed`
    pub fn fail(&self, id: &JobId, detail: impl Into<String>) -> Result<(), Error> {
        let detail = detail.into();
        self.update(id, move |job| job.fail(id, detail))
    }

    /// Move a running job to `Completed`
    pub fn complete(&self, id: &JobId, performance: serde_json::Value) -> Result<(), Error> {
        self.update(id, move |job| job.complete(id, performance))
    }

    fn update<F>(&self, id: &JobId, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Job) -> Result<(), Error>,
    {
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| Error::UnknownJob(id.clone()))?;
        f(job.value_mut())
    }
}
