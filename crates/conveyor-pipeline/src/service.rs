//! Job submission and status queries
//!
//! The transport-independent half of the gateway: validates uploads, derives
//! the job identifier, stages the artifact and hands the job to the
//! supervisor. The HTTP layer only translates requests and responses.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::job::{Job, JobId};
use crate::registry::JobRegistry;
use crate::storage::{JobStorage, ARTIFACT_FILE};
use crate::supervisor::Supervisor;
use crate::SubmitError;

/// Extension accepted on uploaded artifact names
const ARTIFACT_EXTENSION: &str = ".Dockerfile";

/// Receipt for an accepted submission
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Accepted {
    /// Name the client gave the upload
    pub filename: String,
    /// Identifier to poll status with
    pub job_id: JobId,
}

/// Whether `filename` names a Dockerfile
pub fn is_artifact_name(filename: &str) -> bool {
    filename == ARTIFACT_FILE
        || (filename.len() > ARTIFACT_EXTENSION.len() && filename.ends_with(ARTIFACT_EXTENSION))
}

/// Gateway operations over the registry, storage and supervisor
#[derive(Clone)]
pub struct JobService {
    registry: Arc<JobRegistry>,
    storage: JobStorage,
    supervisor: Supervisor,
}

impl JobService {
    /// Build the service on top of a running supervisor
    pub fn new(supervisor: Supervisor) -> Self {
        let orchestrator = supervisor.orchestrator();
        Self {
            registry: Arc::clone(orchestrator.registry()),
            storage: orchestrator.storage().clone(),
            supervisor,
        }
    }

    /// Accept an uploaded Dockerfile and start its pipeline.
    ///
    /// Content that was already submitted is rejected with the existing
    /// identifier; the first job is left untouched.
    pub async fn submit(&self, filename: &str, content: &[u8]) -> Result<Accepted, SubmitError> {
        if !is_artifact_name(filename) {
            return Err(SubmitError::InvalidArtifact {
                filename: filename.to_string(),
            });
        }

        let job_id = JobId::from_content(content);
        if !self.registry.try_insert(&job_id) {
            info!(job_id = %job_id, filename = %filename, "duplicate submission rejected");
            return Err(SubmitError::Duplicate { job_id });
        }

        if let Err(e) = self.storage.stage_artifact(&job_id, content).await {
            error!(job_id = %job_id, error = %e, "failed to stage artifact");
            if let Err(mark) = self
                .registry
                .fail(&job_id, format!("failed to stage artifact: {}", e))
            {
                error!(job_id = %job_id, error = %mark, "failed to record staging failure");
            }
            return Err(e.into());
        }

        info!(job_id = %job_id, filename = %filename, bytes = content.len(), "job accepted");
        self.supervisor.dispatch(job_id.clone());

        Ok(Accepted {
            filename: filename.to_string(),
            job_id,
        })
    }

    /// Snapshot of one job
    pub fn get_status(&self, job_id: &JobId) -> Option<Job> {
        self.registry.get(job_id)
    }

    /// Snapshot of every job
    pub fn list_statuses(&self) -> BTreeMap<JobId, Job> {
        self.registry.list()
    }
}
