//! Data-only workload descriptions and their rendering into Pods
//!
//! A [`WorkloadSpec`] is everything the lifecycle controller needs to run one
//! stage of one job. It carries no stage identity, so the controller stays
//! generic.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use k8s_openapi::api::core::v1::{
    Container, KeyToPath, PersistentVolumeClaimVolumeSource, Pod, PodSpec, SecretVolumeSource,
    Volume as K8sVolume, VolumeMount as K8sVolumeMount,
};
use kube::api::ObjectMeta;

/// Restart policy of every stage Pod; the phase reflects the single run
pub const RESTART_POLICY: &str = "Never";

/// Where a volume's data comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VolumeSource {
    /// A PersistentVolumeClaim by name
    PersistentVolumeClaim {
        /// Claim name
        claim_name: String,
    },
    /// A Secret, projecting selected keys to file paths
    Secret {
        /// Secret name
        secret_name: String,
        /// `(key, path)` pairs
        items: Vec<(String, String)>,
    },
}

/// A named volume available to the workload's container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Volume {
    /// Volume name referenced by mounts
    pub name: String,
    /// Backing source
    pub source: VolumeSource,
}

/// A volume mounted into the container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeMount {
    /// Name of the volume to mount
    pub name: String,
    /// Path inside the container
    pub mount_path: String,
    /// Mount only this sub-directory of the volume
    pub sub_path: Option<String>,
}

/// Single-container workload run to completion for one stage of one job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadSpec {
    /// Pod name, unique per `(stage, job)`
    pub name: String,
    /// Namespace the Pod lives in
    pub namespace: String,
    /// Pod labels
    pub labels: BTreeMap<String, String>,
    /// Container name
    pub container_name: String,
    /// Container image
    pub image: String,
    /// Container arguments
    pub args: Vec<String>,
    /// Image pull policy
    pub image_pull_policy: String,
    /// Mounts into the container
    pub volume_mounts: Vec<VolumeMount>,
    /// Pod volumes
    pub volumes: Vec<Volume>,
    /// Deadline enforced by the cluster, if any
    pub active_deadline: Option<Duration>,
}

impl WorkloadSpec {
    /// Render as a Pod manifest
    pub fn to_pod(&self) -> Pod {
        let container = Container {
            name: self.container_name.clone(),
            image: Some(self.image.clone()),
            image_pull_policy: Some(self.image_pull_policy.clone()),
            args: (!self.args.is_empty()).then(|| self.args.clone()),
            volume_mounts: (!self.volume_mounts.is_empty()).then(|| {
                self.volume_mounts
                    .iter()
                    .map(|m| K8sVolumeMount {
                        name: m.name.clone(),
                        mount_path: m.mount_path.clone(),
                        sub_path: m.sub_path.clone(),
                        ..Default::default()
                    })
                    .collect()
            }),
            ..Default::default()
        };

        let volumes = (!self.volumes.is_empty())
            .then(|| self.volumes.iter().map(render_volume).collect());

        Pod {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: (!self.labels.is_empty()).then(|| self.labels.clone()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                restart_policy: Some(RESTART_POLICY.to_string()),
                active_deadline_seconds: self.active_deadline.map(|d| d.as_secs() as i64),
                containers: vec![container],
                volumes,
                ..Default::default()
            }),
            status: None,
        }
    }
}

fn render_volume(volume: &Volume) -> K8sVolume {
    match &volume.source {
        VolumeSource::PersistentVolumeClaim { claim_name } => K8sVolume {
            name: volume.name.clone(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim_name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        },
        VolumeSource::Secret { secret_name, items } => K8sVolume {
            name: volume.name.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret_name.clone()),
                items: (!items.is_empty()).then(|| {
                    items
                        .iter()
                        .map(|(key, path)| KeyToPath {
                            key: key.clone(),
                            path: path.clone(),
                            ..Default::default()
                        })
                        .collect()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
    }
}

/// Pod phase as reported by the cluster
///
/// `Pending → Running → {Succeeded, Failed, Unknown}`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadPhase {
    /// Accepted, not all containers started
    Pending,
    /// At least one container running
    Running,
    /// All containers exited successfully
    Succeeded,
    /// At least one container failed, or the deadline was hit
    Failed,
    /// Phase could not be determined
    Unknown,
}

impl WorkloadPhase {
    /// Parse the `status.phase` field; a Pod without a phase yet is pending
    pub fn from_phase(phase: Option<&str>) -> Self {
        match phase {
            None | Some("Pending") => WorkloadPhase::Pending,
            Some("Running") => WorkloadPhase::Running,
            Some("Succeeded") => WorkloadPhase::Succeeded,
            Some("Failed") => WorkloadPhase::Failed,
            Some(_) => WorkloadPhase::Unknown,
        }
    }

    /// Phase of a Pod object
    pub fn of(pod: &Pod) -> Self {
        Self::from_phase(pod.status.as_ref().and_then(|s| s.phase.as_deref()))
    }

    /// Whether the workload has stopped changing
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkloadPhase::Pending | WorkloadPhase::Running)
    }

    /// Only `Succeeded` counts as stage success
    pub fn is_success(&self) -> bool {
        matches!(self, WorkloadPhase::Succeeded)
    }
}

impl fmt::Display for WorkloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadPhase::Pending => write!(f, "Pending"),
            WorkloadPhase::Running => write!(f, "Running"),
            WorkloadPhase::Succeeded => write!(f, "Succeeded"),
            WorkloadPhase::Failed => write!(f, "Failed"),
            WorkloadPhase::Unknown => write!(f, "Unknown"),
        }
    }
}

/// What a finished workload left behind
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadOutcome {
    /// Terminal phase
    pub phase: WorkloadPhase,
    /// Full container log
    pub log: String,
}
