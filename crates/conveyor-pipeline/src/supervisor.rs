//! Job task supervision
//!
//! Every accepted job runs in its own Tokio task. A task that fails with a
//! cluster or storage error reports a [`JobFault`] over a channel instead of
//! taking the process down. The [`FaultMonitor`] receives those faults, marks
//! the job `Failed` so it never hangs in `Running`, and either keeps serving
//! or returns the fault so the binary can exit.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::job::JobId;
use crate::orchestrator::Orchestrator;
use crate::Error;

/// A job task that ended with an error
#[derive(Debug)]
pub struct JobFault {
    /// Job whose task failed
    pub job_id: JobId,
    /// What went wrong
    pub error: Error,
}

impl JobFault {
    /// Detail recorded on the job
    pub fn detail(&self) -> String {
        format!("infrastructure fault: {}", self.error)
    }
}

/// Spawns job tasks; cheap to clone
#[derive(Clone)]
pub struct Supervisor {
    orchestrator: Arc<Orchestrator>,
    faults: mpsc::UnboundedSender<JobFault>,
}

/// Receiving side of the fault channel
pub struct FaultMonitor {
    orchestrator: Arc<Orchestrator>,
    faults: mpsc::UnboundedReceiver<JobFault>,
    exit_on_fault: bool,
}

impl Supervisor {
    /// Create a supervisor and the monitor that must be run alongside it
    pub fn new(orchestrator: Arc<Orchestrator>) -> (Self, FaultMonitor) {
        let (tx, rx) = mpsc::unbounded_channel();
        let exit_on_fault = orchestrator.config().exit_on_fault;
        let monitor = FaultMonitor {
            orchestrator: Arc::clone(&orchestrator),
            faults: rx,
            exit_on_fault,
        };
        (
            Self {
                orchestrator,
                faults: tx,
            },
            monitor,
        )
    }

    /// Orchestrator driven by this supervisor
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Run the pipeline for an already-claimed job in the background
    pub fn dispatch(&self, job_id: JobId) -> JoinHandle<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let faults = self.faults.clone();

        tokio::spawn(async move {
            match orchestrator.run_claimed(&job_id).await {
                Ok(status) => debug!(job_id = %job_id, %status, "job task finished"),
                Err(error) => {
                    error!(job_id = %job_id, error = %error, "job task failed");
                    if faults.send(JobFault { job_id, error }).is_err() {
                        warn!("fault monitor gone, fault dropped");
                    }
                }
            }
        })
    }
}

impl FaultMonitor {
    /// Handle faults until shutdown or until every [`Supervisor`] is dropped.
    ///
    /// With exit-on-fault configured, the first fatal fault is returned as an
    /// error. Other faults only fail their job.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), Error> {
        loop {
            let fault = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("fault monitor shutting down");
                    return Ok(());
                }
                fault = self.faults.recv() => fault,
            };

            let Some(fault) = fault else {
                debug!("all supervisors dropped, fault monitor exiting");
                return Ok(());
            };

            self.contain(&fault);
            if self.exit_on_fault && fault.error.is_fatal() {
                error!(job_id = %fault.job_id, "exiting on fatal job fault");
                return Err(fault.error);
            }
        }
    }

    fn contain(&self, fault: &JobFault) {
        let registry = self.orchestrator.registry();
        match registry.fail(&fault.job_id, fault.detail()) {
            Ok(()) => warn!(job_id = %fault.job_id, "job marked failed after fault"),
            // The job may already be terminal if the fault came after the outcome
            Err(e) => debug!(job_id = %fault.job_id, error = %e, "job not updated after fault"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::job::JobStatus;
    use crate::lifecycle::MockWorkloadRunner;
    use crate::registry::JobRegistry;
    use crate::storage::JobStorage;
    use crate::workload::{WorkloadOutcome, WorkloadPhase};

    fn etcd_down(workload: &str) -> Error {
        Error::Infrastructure {
            workload: workload.to_string(),
            source: kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: "etcd unavailable".to_string(),
                reason: "InternalError".to_string(),
                code: 500,
            }),
        }
    }

    fn orchestrator(
        runner: MockWorkloadRunner,
        exit_on_fault: bool,
    ) -> (Arc<Orchestrator>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            exit_on_fault,
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(
            Arc::new(JobRegistry::new()),
            Arc::new(runner),
            JobStorage::new(dir.path()),
            config,
        );
        (Arc::new(orchestrator), dir)
    }

    fn failing_runner() -> MockWorkloadRunner {
        let mut runner = MockWorkloadRunner::new();
        runner
            .expect_run_to_completion()
            .returning(|spec| Err(etcd_down(&spec.name)));
        runner
    }

    /// Story: a cluster fault fails the job and the service keeps going
    #[tokio::test]
    async fn story_fault_is_contained() {
        let (orchestrator, _dir) = orchestrator(failing_runner(), false);
        let (supervisor, monitor) = Supervisor::new(Arc::clone(&orchestrator));
        let shutdown = CancellationToken::new();
        let monitor = tokio::spawn(monitor.run(shutdown.clone()));

        let id = JobId::from_content(b"FROM x");
        assert!(orchestrator.registry().try_insert(&id));
        supervisor.dispatch(id.clone()).await.unwrap();

        let job = wait_for_terminal(&orchestrator, &id).await;
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job
            .error_detail()
            .unwrap()
            .starts_with("infrastructure fault:"));
        assert!(job.error_detail().unwrap().contains("etcd unavailable"));

        shutdown.cancel();
        assert!(monitor.await.unwrap().is_ok());
    }

    /// Story: with exit-on-fault the monitor hands the fault back to main
    #[tokio::test]
    async fn story_fault_stops_monitor_when_configured() {
        let (orchestrator, _dir) = orchestrator(failing_runner(), true);
        let (supervisor, monitor) = Supervisor::new(Arc::clone(&orchestrator));
        let monitor = tokio::spawn(monitor.run(CancellationToken::new()));

        let id = JobId::from_content(b"FROM y");
        orchestrator.registry().try_insert(&id);
        let _task = supervisor.dispatch(id.clone());

        let err = tokio::time::timeout(Duration::from_secs(5), monitor)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            orchestrator.registry().get(&id).unwrap().status(),
            JobStatus::Failed
        );
    }

    /// Story: a transient poll error fails one job but never stops the service
    #[tokio::test]
    async fn story_non_fatal_fault_is_contained_even_with_exit_on_fault() {
        let mut runner = MockWorkloadRunner::new();
        runner.expect_run_to_completion().returning(|spec| {
            Err(Error::kube(
                "poll",
                spec.name.clone(),
                kube::Error::Api(kube::error::ErrorResponse {
                    status: "Failure".to_string(),
                    message: "transient".to_string(),
                    reason: "ServiceUnavailable".to_string(),
                    code: 503,
                }),
            ))
        });
        let (orchestrator, _dir) = orchestrator(runner, true);
        let (supervisor, monitor) = Supervisor::new(Arc::clone(&orchestrator));
        let shutdown = CancellationToken::new();
        let monitor = tokio::spawn(monitor.run(shutdown.clone()));

        let id = JobId::from_content(b"FROM transient");
        orchestrator.registry().try_insert(&id);
        supervisor.dispatch(id.clone()).await.unwrap();

        let job = wait_for_terminal(&orchestrator, &id).await;
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.error_detail().unwrap().contains("[poll]"));

        // Still running: only shutdown ends it
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!monitor.is_finished());
        shutdown.cancel();
        assert!(monitor.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn stage_failures_are_not_faults() {
        let mut runner = MockWorkloadRunner::new();
        runner.expect_run_to_completion().returning(|_| {
            Ok(WorkloadOutcome {
                phase: WorkloadPhase::Failed,
                log: "build failed".to_string(),
            })
        });
        let (orchestrator, _dir) = orchestrator(runner, true);
        let (supervisor, monitor) = Supervisor::new(Arc::clone(&orchestrator));

        let id = JobId::from_content(b"FROM z");
        orchestrator.registry().try_insert(&id);
        supervisor.dispatch(id.clone()).await.unwrap();
        drop(supervisor);

        // No fault was sent, so the monitor exits cleanly once senders are gone
        assert!(monitor.run(CancellationToken::new()).await.is_ok());
        assert_eq!(
            orchestrator.registry().get(&id).unwrap().error_detail(),
            Some("build failed")
        );
    }

    #[test]
    fn fault_detail_names_the_error() {
        let fault = JobFault {
            job_id: JobId::new("abc"),
            error: etcd_down("kaniko-abc"),
        };
        assert!(fault.detail().starts_with("infrastructure fault: "));
        assert!(fault.detail().contains("kaniko-abc"));
    }

    async fn wait_for_terminal(orchestrator: &Orchestrator, id: &JobId) -> crate::job::Job {
        for _ in 0..100 {
            let job = orchestrator.registry().get(id).unwrap();
            if job.status().is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached a terminal status", id);
    }
}
