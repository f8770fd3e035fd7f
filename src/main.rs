//! install-harness - install a component, run a suite against it, tear it down.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Loads the harness configuration from the environment
//! - Creates the Kubernetes client for the configured context
//! - Runs one installation and writes its summary to the artifacts directory

use std::path::Path;

use tracing::{error, info, warn};

use install_harness::lifecycle::RunReport;
use install_harness::{
    ClusterDiagnostics, HarnessConfig, HelmInstaller, KubectlClient, Orchestrator, kube_client,
};

/// File the run summary is written to, under the artifacts directory
const SUMMARY_FILE: &str = "run-summary.json";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("install_harness=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    info!("Starting install-harness");

    let config = HarnessConfig::from_env()?;
    let plan = config.install_plan();
    info!(
        cluster = %config.cluster_name,
        kube_context = ?config.kube_context,
        chart = %config.chart.display(),
        release = %config.release,
        "Loaded harness configuration"
    );

    let client = kube_client(config.kube_context.as_deref()).await?;
    info!("Connected to Kubernetes cluster");

    let cluster = KubectlClient::new(client.clone())
        .with_context(config.kube_context.clone())
        .with_kubectl(&config.kubectl);
    let installer = HelmInstaller::new(&config.release, &config.chart)
        .with_namespace_cleanup(client.clone())
        .with_timeout(config.install_timeout)
        .with_helm(&config.helm);
    let suite = config.suite_runner()?;
    let diagnostics = ClusterDiagnostics::new(client, &config.artifacts_dir, &config.release)
        .with_log_tail_lines(config.log_tail_lines);

    let orchestrator = Orchestrator::new(cluster, installer, suite, diagnostics)
        .with_component_name(&config.release);
    let report = orchestrator.run(&plan).await;

    if let Err(e) = write_summary(&config.artifacts_dir, &report).await {
        warn!(error = %e, "Failed to write run summary");
    }

    match report.into_result() {
        Ok(()) => {
            info!("Run passed");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            Err(e.into())
        }
    }
}

async fn write_summary(artifacts_dir: &Path, report: &RunReport) -> std::io::Result<()> {
    tokio::fs::create_dir_all(artifacts_dir).await?;
    let path = artifacts_dir.join(SUMMARY_FILE);
    let json = serde_json::to_vec_pretty(&report.summary())?;
    tokio::fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote run summary");
    Ok(())
}
