//! Conveyor - Dockerfile build, scan and execute service on Kubernetes

mod config;

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use conveyor_common::kube_utils::create_client;
use conveyor_common::telemetry::{init_telemetry, TelemetryConfig};
use conveyor_pipeline::{
    JobRegistry, JobService, JobStorage, KubePodClient, LifecycleController, Orchestrator,
    Supervisor,
};

use crate::config::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        json: cli.log_json,
        ..Default::default()
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let pipeline_config = cli.pipeline_config();
    pipeline_config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    info!(
        namespace = %pipeline_config.namespace,
        data_root = %pipeline_config.data_root.display(),
        repository = %pipeline_config.repository,
        exit_on_fault = pipeline_config.exit_on_fault,
        "Starting conveyor"
    );

    let client = create_client(cli.kubeconfig.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let shutdown = CancellationToken::new();

    let controller = LifecycleController::new(
        Arc::new(KubePodClient::new(client)),
        pipeline_config.poll_interval,
    )
    .with_shutdown(shutdown.clone());

    let storage = JobStorage::new(pipeline_config.data_root.clone());
    let orchestrator = Orchestrator::new(
        Arc::new(JobRegistry::new()),
        Arc::new(controller),
        storage,
        pipeline_config,
    );
    let (supervisor, monitor) = Supervisor::new(Arc::new(orchestrator));
    let service = Arc::new(JobService::new(supervisor));

    let monitor_shutdown = shutdown.clone();
    let mut monitor_task = tokio::spawn(monitor.run(monitor_shutdown));

    let server_shutdown = shutdown.clone();
    let mut server_task = tokio::spawn(conveyor_api::serve(
        cli.listen_addr,
        conveyor_api::router(service),
        server_shutdown,
    ));

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
        res = &mut monitor_task => match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(error = %e, "Job fault, shutting down");
                Err(anyhow::anyhow!("Job fault: {}", e))
            }
            Err(e) => Err(anyhow::anyhow!("Fault monitor panicked: {}", e)),
        },
        res = &mut server_task => match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::anyhow!("HTTP gateway failed: {}", e)),
            Err(e) => Err(anyhow::anyhow!("HTTP gateway panicked: {}", e)),
        },
    };

    shutdown.cancel();
    if !server_task.is_finished() {
        let _ = server_task.await;
    }
    if !monitor_task.is_finished() {
        let _ = monitor_task.await;
    }

    info!("Conveyor stopped");
    result
}
