//! Dockerfile pipeline crate
//!
//! This crate provides:
//! - Job records and the in-memory registry shared with status queries
//! - Stage descriptions (build with kaniko, scan with grype, execute) as Pod workloads
//! - The lifecycle controller running one workload to completion on the cluster
//! - The orchestrator driving build → scan → execute for a job
//! - The supervisor containing job task faults, and the submission service

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod job;
pub mod lifecycle;
pub mod orchestrator;
pub mod registry;
pub mod service;
pub mod stage;
pub mod storage;
pub mod supervisor;
pub mod workload;

pub use error::{Error, SubmitError};

/// Result type alias using the pipeline Error type
pub type Result<T> = std::result::Result<T, Error>;

pub use config::PipelineConfig;
pub use job::{Job, JobId, JobStatus};
pub use lifecycle::{KubePodClient, LifecycleController, PodClient, WorkloadRunner};
pub use orchestrator::{Orchestrator, Processed};
pub use registry::JobRegistry;
pub use service::{Accepted, JobService};
pub use stage::Stage;
pub use storage::JobStorage;
pub use supervisor::{FaultMonitor, JobFault, Supervisor};
pub use workload::{WorkloadOutcome, WorkloadPhase, WorkloadSpec};

#[cfg(test)]
pub use lifecycle::{MockPodClient, MockWorkloadRunner};
