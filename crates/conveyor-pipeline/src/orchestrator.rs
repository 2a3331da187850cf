//! Job pipeline orchestrator
//!
//! Runs build → scan → execute for one job, strictly in order, recording each
//! finished stage on the job. The first failing stage ends the job as
//! `Failed` with that stage's log; nothing is retried or rolled back.
//!
//! Stage failures never escape [`Orchestrator::process_job`]. Cluster and
//! storage faults do, and are left to the supervisor.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::job::{JobId, JobStatus};
use crate::lifecycle::WorkloadRunner;
use crate::registry::JobRegistry;
use crate::stage::Stage;
use crate::storage::JobStorage;
use crate::Error;

/// What a call to [`Orchestrator::process_job`] did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Processed {
    /// The identifier was already known; nothing ran
    Skipped,
    /// The pipeline ran and left the job in this terminal status
    Finished(JobStatus),
}

/// Owns the registry and drives each job's stages through a [`WorkloadRunner`]
pub struct Orchestrator {
    registry: Arc<JobRegistry>,
    runner: Arc<dyn WorkloadRunner>,
    storage: JobStorage,
    config: PipelineConfig,
}

impl Orchestrator {
    /// Create an orchestrator over an injected registry and runner
    pub fn new(
        registry: Arc<JobRegistry>,
        runner: Arc<dyn WorkloadRunner>,
        storage: JobStorage,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            runner,
            storage,
            config,
        }
    }

    /// Registry shared with status queries
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Shared storage used for artifacts and results
    pub fn storage(&self) -> &JobStorage {
        &self.storage
    }

    /// Pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process a job at most once.
    ///
    /// If the identifier is already in the registry this is a no-op. The
    /// artifact for `job_id` must already be staged.
    pub async fn process_job(&self, job_id: &JobId) -> Result<Processed, Error> {
        if !self.registry.try_insert(job_id) {
            info!(job_id = %job_id, "job already processed, skipping");
            return Ok(Processed::Skipped);
        }
        info!(job_id = %job_id, "processing job");
        self.run_claimed(job_id).await.map(Processed::Finished)
    }

    /// Run the pipeline for a job this caller already inserted in the registry
    pub async fn run_claimed(&self, job_id: &JobId) -> Result<JobStatus, Error> {
        let mut performance = None;

        for stage in Stage::ALL {
            let spec = stage.workload(job_id, &self.config);
            info!(job_id = %job_id, stage = %stage, pod = %spec.name, "starting stage");

            let outcome = self.runner.run_to_completion(&spec).await?;

            if !outcome.phase.is_success() {
                warn!(
                    job_id = %job_id,
                    stage = %stage,
                    phase = %outcome.phase,
                    "stage failed"
                );
                self.registry.fail(job_id, outcome.log)?;
                return Ok(JobStatus::Failed);
            }

            if stage == Stage::Execute {
                match self.storage.read_result(job_id).await {
                    Ok(value) => performance = Some(value),
                    Err(e) => {
                        warn!(job_id = %job_id, error = %e, "execution result unusable");
                        let detail = result_failure_detail(&outcome.log, &e);
                        self.registry.fail(job_id, detail)?;
                        return Ok(JobStatus::Failed);
                    }
                }
            }

            self.registry.record_stage(job_id, stage)?;
            info!(job_id = %job_id, stage = %stage, "stage completed");
        }

        let Some(performance) = performance else {
            error!(job_id = %job_id, "pipeline finished without an execution result");
            return Err(Error::invalid_transition(
                job_id,
                "pipeline finished without an execution result",
            ));
        };
        self.registry.complete(job_id, performance)?;
        info!(job_id = %job_id, "job completed");
        Ok(JobStatus::Completed)
    }
}

/// Error detail for an execute stage whose workload succeeded but whose
/// result file could not be used: the workload log, then the reason.
fn result_failure_detail(log: &str, err: &Error) -> String {
    if log.is_empty() {
        format!("result file: {}", err)
    } else {
        format!("{}\nresult file: {}", log.trim_end(), err)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::lifecycle::MockWorkloadRunner;
    use crate::storage::RESULT_FILE;
    use crate::workload::{WorkloadOutcome, WorkloadPhase};

    /// Test fixture: a tempdir-backed orchestrator with scripted stage outcomes
    struct Fixture {
        orchestrator: Orchestrator,
        dir: tempfile::TempDir,
        started: Arc<Mutex<Vec<String>>>,
    }

    impl Fixture {
        /// `outcomes` maps Pod-name prefix (kaniko/grype/execute) to result
        fn new(outcomes: HashMap<&'static str, (WorkloadPhase, &'static str)>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let started = Arc::new(Mutex::new(Vec::new()));

            let seen = Arc::clone(&started);
            let mut runner = MockWorkloadRunner::new();
            runner.expect_run_to_completion().returning(move |spec| {
                seen.lock().unwrap().push(spec.name.clone());
                let prefix = spec.name.split('-').next().unwrap_or_default();
                let (phase, log) = outcomes
                    .get(prefix)
                    .copied()
                    .unwrap_or((WorkloadPhase::Succeeded, ""));
                Ok(WorkloadOutcome {
                    phase,
                    log: log.to_string(),
                })
            });

            let orchestrator = Orchestrator::new(
                Arc::new(JobRegistry::new()),
                Arc::new(runner),
                JobStorage::new(dir.path()),
                PipelineConfig::default(),
            );
            Self {
                orchestrator,
                dir,
                started,
            }
        }

        fn write_result(&self, id: &JobId, contents: &str) {
            let job_dir = self.dir.path().join(id.as_str());
            std::fs::create_dir_all(&job_dir).unwrap();
            std::fs::write(job_dir.join(RESULT_FILE), contents).unwrap();
        }

        fn started(&self) -> Vec<String> {
            self.started.lock().unwrap().clone()
        }
    }

    fn all_succeed() -> HashMap<&'static str, (WorkloadPhase, &'static str)> {
        HashMap::new()
    }

    /// Story: a clean Dockerfile builds, scans, runs and reports its result
    #[tokio::test]
    async fn story_all_stages_succeed() {
        let fixture = Fixture::new(all_succeed());
        let id = JobId::from_content(b"FROM alpine\nCMD ./bench");
        fixture.write_result(&id, r#"{"perf": {"score": 97}}"#);

        let processed = fixture.orchestrator.process_job(&id).await.unwrap();
        assert_eq!(processed, Processed::Finished(JobStatus::Completed));

        let job = fixture.orchestrator.registry().get(&id).unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.completed_stages(), &Stage::ALL);
        assert_eq!(job.performance(), Some(&serde_json::json!({"score": 97})));
        assert!(job.error_detail().is_none());
        assert_eq!(
            fixture.started(),
            vec![
                format!("kaniko-{}", id),
                format!("grype-{}", id),
                format!("execute-{}", id)
            ]
        );
    }

    /// Story: the build fails; the job fails with the build log and stops
    #[tokio::test]
    async fn story_build_failure_stops_pipeline() {
        let fixture = Fixture::new(HashMap::from([(
            "kaniko",
            (WorkloadPhase::Failed, "error building image: FROM x: not found"),
        )]));
        let id = JobId::from_content(b"FROM x");
        assert_eq!(
            id.as_str(),
            conveyor_common::kube_utils::content_digest(b"FROM x")
        );

        let processed = fixture.orchestrator.process_job(&id).await.unwrap();
        assert_eq!(processed, Processed::Finished(JobStatus::Failed));

        let job = fixture.orchestrator.registry().get(&id).unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.completed_stages().is_empty());
        assert_eq!(
            job.error_detail(),
            Some("error building image: FROM x: not found")
        );
        assert!(job.performance().is_none());
        assert_eq!(fixture.started(), vec![format!("kaniko-{}", id)]);
    }

    /// Story: critical CVEs make the scan workload fail; execute never runs
    #[tokio::test]
    async fn story_scan_failure_keeps_build_stage() {
        let fixture = Fixture::new(HashMap::from([(
            "grype",
            (WorkloadPhase::Failed, "discovered vulnerabilities at or above critical"),
        )]));
        let id = JobId::from_content(b"FROM vulnerable");

        fixture.orchestrator.process_job(&id).await.unwrap();

        let job = fixture.orchestrator.registry().get(&id).unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.completed_stages(), &[Stage::Build]);
        assert!(job.error_detail().unwrap().contains("critical"));
        assert_eq!(fixture.started().len(), 2);
    }

    #[tokio::test]
    async fn unknown_phase_counts_as_failure() {
        let fixture = Fixture::new(HashMap::from([(
            "execute",
            (WorkloadPhase::Unknown, "node lost"),
        )]));
        let id = JobId::from_content(b"FROM flaky");

        fixture.orchestrator.process_job(&id).await.unwrap();

        let job = fixture.orchestrator.registry().get(&id).unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.completed_stages(), &[Stage::Build, Stage::Scan]);
        assert_eq!(job.error_detail(), Some("node lost"));
    }

    /// Story: the image ran fine but never wrote its result file
    #[tokio::test]
    async fn story_missing_result_file_fails_job() {
        let fixture = Fixture::new(HashMap::from([(
            "execute",
            (WorkloadPhase::Succeeded, "hello from the container"),
        )]));
        let id = JobId::from_content(b"FROM busybox");

        let processed = fixture.orchestrator.process_job(&id).await.unwrap();
        assert_eq!(processed, Processed::Finished(JobStatus::Failed));

        let job = fixture.orchestrator.registry().get(&id).unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.completed_stages(), &[Stage::Build, Stage::Scan]);
        let detail = job.error_detail().unwrap();
        assert!(detail.starts_with("hello from the container"));
        assert!(detail.contains("perf.json"));
    }

    #[tokio::test]
    async fn malformed_result_file_fails_job() {
        let fixture = Fixture::new(all_succeed());
        let id = JobId::from_content(b"FROM broken-output");
        fixture.write_result(&id, r#"{"score": 1}"#);

        fixture.orchestrator.process_job(&id).await.unwrap();

        let job = fixture.orchestrator.registry().get(&id).unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.completed_stages().len() < 3);
        assert!(job.error_detail().unwrap().contains("missing 'perf' field"));
    }

    #[tokio::test]
    async fn null_perf_never_completes_a_job() {
        let fixture = Fixture::new(all_succeed());
        let id = JobId::from_content(b"FROM null-output");
        fixture.write_result(&id, r#"{"perf": null}"#);

        fixture.orchestrator.process_job(&id).await.unwrap();

        let job = fixture.orchestrator.registry().get(&id).unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.performance().is_none());
        assert_eq!(job.completed_stages(), &[Stage::Build, Stage::Scan]);
    }

    #[tokio::test]
    async fn known_job_is_never_reprocessed() {
        let fixture = Fixture::new(all_succeed());
        let id = JobId::from_content(b"FROM twice");
        fixture.write_result(&id, r#"{"perf": 1}"#);

        fixture.orchestrator.process_job(&id).await.unwrap();
        let again = fixture.orchestrator.process_job(&id).await.unwrap();

        assert_eq!(again, Processed::Skipped);
        assert_eq!(fixture.started().len(), 3);
    }

    #[tokio::test]
    async fn cluster_faults_escape_and_leave_job_running() {
        let mut runner = MockWorkloadRunner::new();
        runner.expect_run_to_completion().returning(|spec| {
            Err(Error::Infrastructure {
                workload: spec.name.clone(),
                source: kube::Error::Api(kube::error::ErrorResponse {
                    status: "Failure".to_string(),
                    message: "etcd unavailable".to_string(),
                    reason: "InternalError".to_string(),
                    code: 500,
                }),
            })
        });
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(
            Arc::new(JobRegistry::new()),
            Arc::new(runner),
            JobStorage::new(dir.path()),
            PipelineConfig::default(),
        );
        let id = JobId::from_content(b"FROM x");

        let err = orchestrator.process_job(&id).await.unwrap_err();
        assert!(err.is_fatal());
        let job = orchestrator.registry().get(&id).unwrap();
        assert_eq!(job.status(), JobStatus::Running);
    }

    /// Story: jobs run side by side without touching each other's records
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn story_concurrent_jobs_are_isolated() {
        let fixture = Arc::new(Fixture::new(all_succeed()));
        let ids: Vec<_> = (0..6)
            .map(|i| JobId::from_content(format!("FROM image-{}", i).as_bytes()))
            .collect();
        for (i, id) in ids.iter().enumerate() {
            if i % 2 == 0 {
                fixture.write_result(id, &format!(r#"{{"perf": {}}}"#, i));
            }
        }

        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let fixture = Arc::clone(&fixture);
                tokio::spawn(async move { fixture.orchestrator.process_job(&id).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        for (i, id) in ids.iter().enumerate() {
            let job = fixture.orchestrator.registry().get(id).unwrap();
            if i % 2 == 0 {
                assert_eq!(job.status(), JobStatus::Completed);
                assert_eq!(job.performance(), Some(&serde_json::json!(i)));
            } else {
                assert_eq!(job.status(), JobStatus::Failed);
                assert_eq!(job.completed_stages(), &[Stage::Build, Stage::Scan]);
            }
        }
    }

    #[test]
    fn result_failure_detail_appends_reason() {
        let err = Error::ResultFile {
            path: "/data/a/perf.json".into(),
            message: "malformed JSON".to_string(),
        };
        assert_eq!(
            result_failure_detail("line1\n", &err),
            format!("line1\nresult file: {}", err)
        );
        assert_eq!(
            result_failure_detail("", &err),
            format!("result file: {}", err)
        );
    }
}
