//! Job model and its state machine
//!
//! A job moves `Running → Completed` or `Running → Failed` exactly once.
//! Stages are recorded strictly in pipeline order and never removed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::stage::Stage;
use crate::Error;

/// Content-addressed job identifier (lowercase hex SHA-256 of the artifact)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derive the identifier from artifact bytes
    pub fn from_content(content: &[u8]) -> Self {
        Self(conveyor_common::kube_utils::content_digest(content))
    }

    /// Wrap an identifier received from a client (e.g., a status query)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Overall job status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Pipeline in progress
    #[default]
    Running,
    /// All stages succeeded
    Completed,
    /// A stage failed; see `error_detail`
    Failed,
}

impl JobStatus {
    /// Whether no further transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Job record as stored in the registry and returned by status queries
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    status: JobStatus,
    completed_stages: Vec<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    performance: Option<serde_json::Value>,
}

impl Job {
    /// A freshly accepted job: running, nothing completed yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Stages finished so far, in pipeline order
    pub fn completed_stages(&self) -> &[Stage] {
        &self.completed_stages
    }

    /// Captured log of the failing stage
    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    /// Result reported by the executed image
    pub fn performance(&self) -> Option<&serde_json::Value> {
        self.performance.as_ref()
    }

    /// Stage the pipeline would run next, if any
    pub fn next_stage(&self) -> Option<Stage> {
        Stage::ALL.get(self.completed_stages.len()).copied()
    }

    /// Record a successfully finished stage.
    ///
    /// The stage must be the next one in pipeline order.
    pub fn record_stage(&mut self, id: &JobId, stage: Stage) -> Result<(), Error> {
        self.ensure_running(id)?;
        match self.next_stage() {
            Some(next) if next == stage => {
                self.completed_stages.push(stage);
                Ok(())
            }
            Some(next) => Err(Error::invalid_transition(
                id,
                format!("stage {} recorded before {}", stage, next),
            )),
            None => Err(Error::invalid_transition(
                id,
                format!("stage {} recorded after pipeline end", stage),
            )),
        }
    }

    /// Mark the job failed with the failing stage's captured output
    pub fn fail(&mut self, id: &JobId, detail: impl Into<String>) -> Result<(), Error> {
        self.ensure_running(id)?;
        let mut detail = detail.into();
        if detail.is_empty() {
            detail = "stage failed without output".to_string();
        }
        self.status = JobStatus::Failed;
        self.error_detail = Some(detail);
        Ok(())
    }

    /// Mark the job completed with the executed image's result
    pub fn complete(&mut self, id: &JobId, performance: serde_json::Value) -> Result<(), Error> {
        self.ensure_running(id)?;
        if let Some(next) = self.next_stage() {
            return Err(Error::invalid_transition(
                id,
                format!("cannot complete before stage {}", next),
            ));
        }
        self.status = JobStatus::Completed;
        self.performance = Some(performance);
        Ok(())
    }

    fn ensure_running(&self, id: &JobId) -> Result<(), Error> {
        if self.status.is_terminal() {
            return Err(Error::invalid_transition(
                id,
                format!("job already {}", self.status),
            ));
        }
        Ok(())
    }
}
