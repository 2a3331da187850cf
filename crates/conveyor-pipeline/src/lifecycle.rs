//! Workload lifecycle controller
//!
//! Runs one [`WorkloadSpec`] to completion on the cluster:
//! create (or attach) → poll until terminal → read log → delete.
//!
//! The cluster is reached through the [`PodClient`] trait so tests can mock
//! Kubernetes interactions while production code uses real API calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, LogParams, PostParams};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[cfg(test)]
use mockall::automock;

use conveyor_common::kube_utils::is_not_found;

use crate::workload::{WorkloadOutcome, WorkloadPhase, WorkloadSpec};
use crate::Error;

/// Trait abstracting the Pod operations a stage needs
///
/// Every call is scoped to a namespace and Pod name. "Not found" is reported
/// as `Ok(None)` from [`PodClient::phase`] and swallowed by
/// [`PodClient::delete`]; every other API failure is returned as-is.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodClient: Send + Sync {
    /// Current phase of the Pod, or `None` if it does not exist
    async fn phase(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadPhase>, kube::Error>;

    /// Submit a new Pod
    async fn create(&self, namespace: &str, pod: &Pod) -> Result<(), kube::Error>;

    /// Full log of the Pod's container
    async fn logs(&self, namespace: &str, name: &str) -> Result<String, kube::Error>;

    /// Delete the Pod; succeeds if it is already gone
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;
}

/// [`PodClient`] backed by the Kubernetes API
pub struct KubePodClient {
    client: Client,
}

impl KubePodClient {
    /// Create a new KubePodClient
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl PodClient for KubePodClient {
    async fn phase(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkloadPhase>, kube::Error> {
        let pod = self.api(namespace).get_opt(name).await?;
        Ok(pod.as_ref().map(WorkloadPhase::of))
    }

    async fn create(&self, namespace: &str, pod: &Pod) -> Result<(), kube::Error> {
        self.api(namespace)
            .create(&PostParams::default(), pod)
            .await?;
        Ok(())
    }

    async fn logs(&self, namespace: &str, name: &str) -> Result<String, kube::Error> {
        self.api(namespace).logs(name, &LogParams::default()).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        match self
            .api(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Runs a workload description to a terminal phase
///
/// The orchestrator only depends on this seam, so it never sees Pods.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadRunner: Send + Sync {
    /// Create, wait, collect the log, clean up
    async fn run_to_completion(&self, spec: &WorkloadSpec) -> Result<WorkloadOutcome, Error>;
}

/// Pod-based [`WorkloadRunner`]
pub struct LifecycleController {
    client: Arc<dyn PodClient>,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl LifecycleController {
    /// Create a controller polling at the given interval
    pub fn new(client: Arc<dyn PodClient>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
            shutdown: CancellationToken::new(),
        }
    }

    /// Abort waits when the token is cancelled
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Make sure a live Pod for `spec` exists.
    ///
    /// A Pod still pending or running is attached to. A Pod already in a
    /// terminal phase is a leftover from an earlier run: it is deleted and
    /// recreated so its stale outcome is never reported.
    async fn ensure_workload(&self, spec: &WorkloadSpec) -> Result<(), Error> {
        let (namespace, name) = (spec.namespace.as_str(), spec.name.as_str());

        match self.client.phase(namespace, name).await {
            Ok(None) => {}
            Ok(Some(phase)) if !phase.is_terminal() => {
                info!(pod = %name, %phase, "attaching to existing workload");
                return Ok(());
            }
            Ok(Some(phase)) => {
                warn!(pod = %name, %phase, "replacing stale workload");
                self.client
                    .delete(namespace, name)
                    .await
                    .map_err(|e| Error::kube("delete", name, e))?;
                self.wait_until_gone(namespace, name).await?;
            }
            Err(source) => {
                return Err(Error::Infrastructure {
                    workload: name.to_string(),
                    source,
                })
            }
        }

        match self.client.create(namespace, &spec.to_pod()).await {
            Ok(()) => {
                info!(pod = %name, namespace = %namespace, image = %spec.image, "workload created");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                info!(pod = %name, "workload created concurrently, attaching");
                Ok(())
            }
            Err(e) => Err(Error::kube("create", name, e)),
        }
    }

    async fn wait_for_terminal(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadPhase, Error> {
        loop {
            match self.client.phase(namespace, name).await {
                Ok(Some(phase)) if phase.is_terminal() => return Ok(phase),
                Ok(Some(phase)) => trace!(pod = %name, %phase, "workload not finished yet"),
                Ok(None) => {
                    return Err(Error::WorkloadVanished {
                        workload: name.to_string(),
                    })
                }
                Err(e) => return Err(Error::kube("poll", name, e)),
            }
            self.pause(name).await?;
        }
    }

    async fn wait_until_gone(&self, namespace: &str, name: &str) -> Result<(), Error> {
        loop {
            match self.client.phase(namespace, name).await {
                Ok(None) => return Ok(()),
                Ok(Some(_)) => trace!(pod = %name, "waiting for deletion"),
                Err(e) => return Err(Error::kube("delete", name, e)),
            }
            self.pause(name).await?;
        }
    }

    async fn pause(&self, name: &str) -> Result<(), Error> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(Error::Cancelled {
                workload: name.to_string(),
            }),
            _ = tokio::time::sleep(self.poll_interval) => Ok(()),
        }
    }
}

#[async_trait]
impl WorkloadRunner for LifecycleController {
    async fn run_to_completion(&self, spec: &WorkloadSpec) -> Result<WorkloadOutcome, Error> {
        let (namespace, name) = (spec.namespace.as_str(), spec.name.as_str());

        self.ensure_workload(spec).await?;

        let phase = match self.wait_for_terminal(namespace, name).await {
            Ok(phase) => phase,
            Err(e) => {
                if matches!(e, Error::Cancelled { .. }) {
                    if let Err(del) = self.client.delete(namespace, name).await {
                        warn!(pod = %name, error = %del, "failed to delete workload on shutdown");
                    }
                }
                return Err(e);
            }
        };
        debug!(pod = %name, %phase, "workload reached terminal phase");

        let log = self
            .client
            .logs(namespace, name)
            .await
            .map_err(|e| Error::kube("logs", name, e));

        // Cleanup happens whether or not the log could be read.
        let deleted = self
            .client
            .delete(namespace, name)
            .await
            .map_err(|e| Error::kube("delete", name, e));

        let log = log?;
        deleted?;
        info!(pod = %name, %phase, log_bytes = log.len(), "workload finished and removed");

        Ok(WorkloadOutcome { phase, log })
    }
}
