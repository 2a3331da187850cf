//! Pipeline configuration
//!
//! Defaults match the production deployment: stage Pods in `default`, the
//! shared PVC `task-pv-claim` mounted at `/data`, images pushed to
//! `kubelearner/kube-platform`.

use std::path::PathBuf;
use std::time::Duration;

use conveyor_common::Error as CommonError;

/// Default image repository built images are pushed to
pub const DEFAULT_REPOSITORY: &str = "kubelearner/kube-platform";
/// Default dockerconfigjson secret used by the builder to push
pub const DEFAULT_REGISTRY_SECRET: &str = "regcred";
/// Default volume name for the shared storage in Pod specs
pub const DEFAULT_VOLUME_NAME: &str = "task-pv-volume";
/// Default PersistentVolumeClaim backing the shared storage
pub const DEFAULT_CLAIM_NAME: &str = "task-pv-claim";
/// Default image builder
pub const DEFAULT_BUILDER_IMAGE: &str = "gcr.io/kaniko-project/executor:latest";
/// Default vulnerability scanner
pub const DEFAULT_SCANNER_IMAGE: &str = "anchore/grype:latest";
/// Default pull policy for every stage container
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "IfNotPresent";
/// Where the shared storage is mounted, both in stage Pods and locally
pub const DEFAULT_DATA_PATH: &str = "/data";
/// Deadline enforced by the cluster on the execute stage
pub const DEFAULT_EXECUTE_DEADLINE: Duration = Duration::from_secs(60);
/// Interval between workload phase polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Settings shared by every stage of every job
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Namespace stage Pods are created in
    pub namespace: String,
    /// Image repository built images are pushed to (`<repository>:<job_id>`)
    pub repository: String,
    /// Secret holding `.dockerconfigjson` for pushing to the repository
    pub registry_secret: String,
    /// Volume name for the shared storage inside Pod specs
    pub volume_name: String,
    /// PersistentVolumeClaim backing the shared storage
    pub claim_name: String,
    /// Image used by the build stage
    pub builder_image: String,
    /// Image used by the scan stage
    pub scanner_image: String,
    /// Pull policy for all stage containers
    pub image_pull_policy: String,
    /// Mount path of the shared storage inside stage Pods
    pub data_mount_path: String,
    /// Local path of the shared storage as seen by this process
    pub data_root: PathBuf,
    /// Active deadline of the execute stage
    pub execute_deadline: Duration,
    /// Interval between phase polls while a workload runs
    pub poll_interval: Duration,
    /// Shut the process down on an infrastructure fault instead of containing it
    pub exit_on_fault: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            namespace: conveyor_common::DEFAULT_NAMESPACE.to_string(),
            repository: DEFAULT_REPOSITORY.to_string(),
            registry_secret: DEFAULT_REGISTRY_SECRET.to_string(),
            volume_name: DEFAULT_VOLUME_NAME.to_string(),
            claim_name: DEFAULT_CLAIM_NAME.to_string(),
            builder_image: DEFAULT_BUILDER_IMAGE.to_string(),
            scanner_image: DEFAULT_SCANNER_IMAGE.to_string(),
            image_pull_policy: DEFAULT_IMAGE_PULL_POLICY.to_string(),
            data_mount_path: DEFAULT_DATA_PATH.to_string(),
            data_root: PathBuf::from(DEFAULT_DATA_PATH),
            execute_deadline: DEFAULT_EXECUTE_DEADLINE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            exit_on_fault: false,
        }
    }
}

impl PipelineConfig {
    /// Reject settings that would produce unusable Pod specs or a busy loop
    pub fn validate(&self) -> Result<(), CommonError> {
        let required = [
            ("namespace", &self.namespace),
            ("repository", &self.repository),
            ("registry_secret", &self.registry_secret),
            ("volume_name", &self.volume_name),
            ("claim_name", &self.claim_name),
            ("builder_image", &self.builder_image),
            ("scanner_image", &self.scanner_image),
            ("data_mount_path", &self.data_mount_path),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CommonError::config_for_field(field, "must not be empty"));
            }
        }
        if !self.data_mount_path.starts_with('/') {
            return Err(CommonError::config_for_field(
                "data_mount_path",
                "must be an absolute path",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(CommonError::config_for_field(
                "poll_interval",
                "must be greater than zero",
            ));
        }
        if self.execute_deadline.as_secs() == 0 {
            return Err(CommonError::config_for_field(
                "execute_deadline",
                "must be at least one second",
            ));
        }
        Ok(())
    }

    /// Fully qualified image reference for a job's built image
    pub fn image_for(&self, job_id: &str) -> String {
        format!("{}:{}", self.repository, job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.namespace, "default");
        assert_eq!(config.execute_deadline, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert!(!config.exit_on_fault);
    }

    #[test]
    fn image_reference_is_tagged_with_job() {
        let config = PipelineConfig::default();
        assert_eq!(config.image_for("abc"), "kubelearner/kube-platform:abc");
    }

    #[test]
    fn rejects_empty_namespace() {
        let config = PipelineConfig {
            namespace: " ".to_string(),
            ..Default::default()
        };
        match config.validate() {
            Err(CommonError::Config { field, .. }) => assert_eq!(field, "namespace"),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_zero_poll_interval_and_deadline() {
        let config = PipelineConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            execute_deadline: Duration::from_millis(500),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_relative_mount_path() {
        let config = PipelineConfig {
            data_mount_path: "data".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
