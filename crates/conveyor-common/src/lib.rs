//! Common building blocks for Conveyor: errors, telemetry and Kubernetes helpers

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Namespace where stage Pods are created unless configured otherwise
pub const DEFAULT_NAMESPACE: &str = "default";

/// Field manager / component name reported to the API server and in logs
pub const COMPONENT_NAME: &str = "conveyor";

/// Label key carrying the job identifier on every stage Pod
pub const JOB_ID_LABEL: &str = "job_id";

/// Label key marking Pods managed by Conveyor
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
