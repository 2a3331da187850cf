//! Stage definitions
//!
//! Each stage maps a job identifier to the workload that performs it:
//! - **build**: kaniko builds the staged Dockerfile and pushes `<repository>:<job_id>`
//! - **scan**: grype scans that image across all layers, failing on critical findings
//! - **execute**: the built image runs with a deadline and the job's storage sub-path

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::job::JobId;
use crate::workload::{Volume, VolumeMount, VolumeSource, WorkloadSpec};

/// Volume name for the builder's registry credentials
const REGISTRY_CREDENTIALS_VOLUME: &str = "kaniko-secret";
/// Where kaniko looks for registry credentials
const REGISTRY_CREDENTIALS_PATH: &str = "/kaniko/.docker";

/// One step of the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Build and push the image
    Build,
    /// Vulnerability scan of the pushed image
    Scan,
    /// Run the image
    Execute,
}

impl Stage {
    /// All stages in pipeline order
    pub const ALL: [Stage; 3] = [Stage::Build, Stage::Scan, Stage::Execute];

    /// Stage name as reported in job records
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Build => "build",
            Stage::Scan => "scan",
            Stage::Execute => "execute",
        }
    }

    /// Prefix of the Pod name for this stage
    fn pod_prefix(&self) -> &'static str {
        match self {
            Stage::Build => "kaniko",
            Stage::Scan => "grype",
            Stage::Execute => "execute",
        }
    }

    /// Pod name for this stage of a job
    pub fn workload_name(&self, job_id: &JobId) -> String {
        format!("{}-{}", self.pod_prefix(), job_id)
    }

    /// Workload performing this stage for a job
    pub fn workload(&self, job_id: &JobId, config: &PipelineConfig) -> WorkloadSpec {
        match self {
            Stage::Build => build_workload(job_id, config),
            Stage::Scan => scan_workload(job_id, config),
            Stage::Execute => execute_workload(job_id, config),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn base_workload(stage: Stage, job_id: &JobId, config: &PipelineConfig) -> WorkloadSpec {
    WorkloadSpec {
        name: stage.workload_name(job_id),
        namespace: config.namespace.clone(),
        labels: BTreeMap::from([
            (
                conveyor_common::JOB_ID_LABEL.to_string(),
                job_id.to_string(),
            ),
            (
                conveyor_common::MANAGED_BY_LABEL.to_string(),
                conveyor_common::COMPONENT_NAME.to_string(),
            ),
        ]),
        container_name: stage.pod_prefix().to_string(),
        image: String::new(),
        args: Vec::new(),
        image_pull_policy: config.image_pull_policy.clone(),
        volume_mounts: Vec::new(),
        volumes: Vec::new(),
        active_deadline: None,
    }
}

fn shared_volume(config: &PipelineConfig) -> Volume {
    Volume {
        name: config.volume_name.clone(),
        source: VolumeSource::PersistentVolumeClaim {
            claim_name: config.claim_name.clone(),
        },
    }
}

fn build_workload(job_id: &JobId, config: &PipelineConfig) -> WorkloadSpec {
    let mount = config.data_mount_path.trim_end_matches('/');
    WorkloadSpec {
        image: config.builder_image.clone(),
        args: vec![
            format!("--context=dir://{}/{}", mount, job_id),
            format!("--destination={}", config.image_for(job_id.as_str())),
        ],
        volume_mounts: vec![
            VolumeMount {
                name: config.volume_name.clone(),
                mount_path: config.data_mount_path.clone(),
                sub_path: None,
            },
            VolumeMount {
                name: REGISTRY_CREDENTIALS_VOLUME.to_string(),
                mount_path: REGISTRY_CREDENTIALS_PATH.to_string(),
                sub_path: None,
            },
        ],
        volumes: vec![
            shared_volume(config),
            Volume {
                name: REGISTRY_CREDENTIALS_VOLUME.to_string(),
                source: VolumeSource::Secret {
                    secret_name: config.registry_secret.clone(),
                    items: vec![(".dockerconfigjson".to_string(), "config.json".to_string())],
                },
            },
        ],
        ..base_workload(Stage::Build, job_id, config)
    }
}

fn scan_workload(job_id: &JobId, config: &PipelineConfig) -> WorkloadSpec {
    WorkloadSpec {
        image: config.scanner_image.clone(),
        args: vec![
            config.image_for(job_id.as_str()),
            "--scope=all-layers".to_string(),
            "--fail-on=critical".to_string(),
            "-o=json".to_string(),
        ],
        ..base_workload(Stage::Scan, job_id, config)
    }
}

fn execute_workload(job_id: &JobId, config: &PipelineConfig) -> WorkloadSpec {
    WorkloadSpec {
        container_name: job_id.to_string(),
        image: config.image_for(job_id.as_str()),
        volume_mounts: vec![VolumeMount {
            name: config.volume_name.clone(),
            mount_path: config.data_mount_path.clone(),
            sub_path: Some(job_id.to_string()),
        }],
        volumes: vec![shared_volume(config)],
        active_deadline: Some(config.execute_deadline),
        ..base_workload(Stage::Execute, job_id, config)
    }
}
