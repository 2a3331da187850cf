//! Pipeline error types
//!
//! Stage failures are not errors: they are recorded on the job. What ends up
//! here is either a cluster/infrastructure problem, a storage problem, or a
//! rejected state transition.

use std::path::PathBuf;

use thiserror::Error;

use crate::job::JobId;

/// Error type for pipeline operations
#[derive(Debug, Error)]
pub enum Error {
    /// Cluster API error the orchestrator cannot trust its view past.
    ///
    /// Raised when looking up a workload fails for any reason other than
    /// "not found". The supervisor treats it as fatal.
    #[error("infrastructure fault on workload {workload}: {source}")]
    Infrastructure {
        /// Workload (Pod) name being looked up
        workload: String,
        /// The underlying kube-rs error
        source: kube::Error,
    },

    /// Cluster API error while driving an existing workload
    #[error("kubernetes error [{context}] on workload {workload}: {source}")]
    Kube {
        /// Operation that failed (e.g., "create", "poll", "logs")
        context: String,
        /// Workload (Pod) name
        workload: String,
        /// The underlying kube-rs error
        source: kube::Error,
    },

    /// Workload disappeared while being waited on (deleted by someone else)
    #[error("workload {workload} disappeared before reaching a terminal phase")]
    WorkloadVanished {
        /// Workload (Pod) name
        workload: String,
    },

    /// Waiting on a workload was cancelled by shutdown
    #[error("wait cancelled for workload {workload}")]
    Cancelled {
        /// Workload (Pod) name
        workload: String,
    },

    /// Job state machine rejected a mutation
    #[error("invalid transition for job {job_id}: {message}")]
    InvalidTransition {
        /// Job being mutated
        job_id: JobId,
        /// What was attempted
        message: String,
    },

    /// Job not present in the registry
    #[error("job {0} not found")]
    UnknownJob(JobId),

    /// Shared storage I/O failure
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        /// File or directory involved
        path: PathBuf,
        /// The underlying I/O error
        source: std::io::Error,
    },

    /// Result file present but unusable
    #[error("invalid result file {}: {message}", path.display())]
    ResultFile {
        /// Path of the result file
        path: PathBuf,
        /// Why it could not be used
        message: String,
    },
}

impl Error {
    /// Build a kube error with operation context
    pub fn kube(
        context: impl Into<String>,
        workload: impl Into<String>,
        source: kube::Error,
    ) -> Self {
        Self::Kube {
            context: context.into(),
            workload: workload.into(),
            source,
        }
    }

    /// Build an invalid transition error
    pub fn invalid_transition(job_id: &JobId, message: impl Into<String>) -> Self {
        Self::InvalidTransition {
            job_id: job_id.clone(),
            message: message.into(),
        }
    }

    /// Whether this error means the cluster view can no longer be trusted.
    ///
    /// A job whose existence check hit one of these cannot be resumed by
    /// polling again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Infrastructure { .. })
    }
}

/// Rejections returned by [`crate::service::JobService::submit`]
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The same content was already submitted
    #[error("Dockerfile already processed, with job_id={job_id}")]
    Duplicate {
        /// Identifier of the existing job
        job_id: JobId,
    },

    /// The upload is not a Dockerfile
    #[error("invalid artifact '{filename}': expected 'Dockerfile' or '<name>.Dockerfile'")]
    InvalidArtifact {
        /// Name the client gave the upload
        filename: String,
    },

    /// The artifact could not be staged
    #[error(transparent)]
    Pipeline(#[from] Error),
}
