//! Command-line and environment configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use conveyor_api::DEFAULT_LISTEN_ADDR;
use conveyor_pipeline::config::{
    DEFAULT_BUILDER_IMAGE, DEFAULT_CLAIM_NAME, DEFAULT_DATA_PATH, DEFAULT_IMAGE_PULL_POLICY,
    DEFAULT_REGISTRY_SECRET, DEFAULT_REPOSITORY, DEFAULT_SCANNER_IMAGE, DEFAULT_VOLUME_NAME,
};
use conveyor_pipeline::PipelineConfig;

/// Conveyor - build, scan and run uploaded Dockerfiles as Kubernetes Pods
#[derive(Parser, Debug, Clone)]
#[command(name = "conveyor", version, about, long_about = None)]
pub struct Cli {
    /// Address the HTTP gateway listens on
    #[arg(long, env = "CONVEYOR_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: SocketAddr,

    /// Path to a kubeconfig; in-cluster or default configuration if unset
    #[arg(long, env = "CONVEYOR_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace stage Pods are created in
    #[arg(long, env = "CONVEYOR_NAMESPACE", default_value = conveyor_common::DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Local mount of the shared volume (artifacts and results)
    #[arg(long, env = "CONVEYOR_DATA_DIR", default_value = DEFAULT_DATA_PATH)]
    pub data_dir: PathBuf,

    /// Mount path of the shared volume inside stage Pods
    #[arg(long, env = "CONVEYOR_DATA_MOUNT_PATH", default_value = DEFAULT_DATA_PATH)]
    pub data_mount_path: String,

    /// Repository built images are pushed to
    #[arg(long, env = "CONVEYOR_REPOSITORY", default_value = DEFAULT_REPOSITORY)]
    pub repository: String,

    /// Secret with registry push credentials (.dockerconfigjson)
    #[arg(long, env = "CONVEYOR_REGISTRY_SECRET", default_value = DEFAULT_REGISTRY_SECRET)]
    pub registry_secret: String,

    /// Volume name of the shared storage in Pod specs
    #[arg(long, env = "CONVEYOR_VOLUME_NAME", default_value = DEFAULT_VOLUME_NAME)]
    pub volume_name: String,

    /// PersistentVolumeClaim backing the shared storage
    #[arg(long, env = "CONVEYOR_CLAIM_NAME", default_value = DEFAULT_CLAIM_NAME)]
    pub claim_name: String,

    /// Image of the build stage
    #[arg(long, env = "CONVEYOR_BUILDER_IMAGE", default_value = DEFAULT_BUILDER_IMAGE)]
    pub builder_image: String,

    /// Image of the scan stage
    #[arg(long, env = "CONVEYOR_SCANNER_IMAGE", default_value = DEFAULT_SCANNER_IMAGE)]
    pub scanner_image: String,

    /// Pull policy of every stage container
    #[arg(long, env = "CONVEYOR_IMAGE_PULL_POLICY", default_value = DEFAULT_IMAGE_PULL_POLICY)]
    pub image_pull_policy: String,

    /// Active deadline of the execute stage, in seconds
    #[arg(long, env = "CONVEYOR_EXECUTE_DEADLINE_SECS", default_value_t = 60)]
    pub execute_deadline_secs: u64,

    /// Interval between Pod phase polls, in milliseconds
    #[arg(long, env = "CONVEYOR_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Exit the process on the first job infrastructure fault
    #[arg(long, env = "CONVEYOR_EXIT_ON_FAULT")]
    pub exit_on_fault: bool,

    /// Emit JSON log lines
    #[arg(long, env = "CONVEYOR_LOG_JSON", default_value_t = true, action = clap::ArgAction::Set)]
    pub log_json: bool,
}

impl Cli {
    /// Pipeline settings described by these arguments
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            namespace: self.namespace.clone(),
            repository: self.repository.clone(),
            registry_secret: self.registry_secret.clone(),
            volume_name: self.volume_name.clone(),
            claim_name: self.claim_name.clone(),
            builder_image: self.builder_image.clone(),
            scanner_image: self.scanner_image.clone(),
            image_pull_policy: self.image_pull_policy.clone(),
            data_mount_path: self.data_mount_path.clone(),
            data_root: self.data_dir.clone(),
            execute_deadline: Duration::from_secs(self.execute_deadline_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            exit_on_fault: self.exit_on_fault,
        }
    }
}
