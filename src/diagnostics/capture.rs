//! Dump the install namespace to disk for a failed run.
//!
//! Writes into `<artifacts>/<namespace>-<timestamp>/`:
//! - `pods.json` - every pod in the namespace
//! - `events.txt` - namespace events, oldest first
//! - `logs/<pod>_<container>.log` - tail of each container's log
//! - `hints.txt` - commands for digging further

use std::path::{Path, PathBuf};

use jiff::Timestamp;
use k8s_openapi::api::core::v1::{Event, Pod};
use kube::api::{Api, ListParams, LogParams};
use kube::{Client, ResourceExt};
use tracing::{info, warn};

use crate::context::InstallationContext;
use crate::diagnostics::DiagnosticsHook;
use crate::diagnostics::hints::DiagnosticHint;
use crate::error::ClusterError;
use crate::lifecycle::Stage;

/// Default number of log lines kept per container
pub const DEFAULT_LOG_TAIL_LINES: i64 = 500;

/// Writes namespace state to an artifacts directory.
#[derive(Clone)]
pub struct ClusterDiagnostics {
    client: Client,
    artifacts_dir: PathBuf,
    release: String,
    log_tail_lines: i64,
}

impl ClusterDiagnostics {
    /// Create a hook writing under `artifacts_dir`
    pub fn new(client: Client, artifacts_dir: impl Into<PathBuf>, release: impl Into<String>) -> Self {
        Self {
            client,
            artifacts_dir: artifacts_dir.into(),
            release: release.into(),
            log_tail_lines: DEFAULT_LOG_TAIL_LINES,
        }
    }

    /// Set how many log lines to keep per container
    pub fn with_log_tail_lines(mut self, lines: i64) -> Self {
        self.log_tail_lines = lines;
        self
    }

    async fn write_pods(&self, dir: &Path, pods: &[Pod]) -> Result<(), ClusterError> {
        let json = serde_json::to_vec_pretty(pods)?;
        tokio::fs::write(dir.join("pods.json"), json).await?;
        Ok(())
    }

    async fn write_events(&self, dir: &Path, namespace: &str) -> Result<(), ClusterError> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let mut events = api.list(&ListParams::default()).await?.items;
        events.sort_by_key(event_time);

        let rendered: String = events.iter().map(render_event).collect();
        tokio::fs::write(dir.join("events.txt"), rendered).await?;
        Ok(())
    }

    async fn write_logs(&self, dir: &Path, namespace: &str, pods: &[Pod]) -> Result<(), ClusterError> {
        let logs_dir = dir.join("logs");
        tokio::fs::create_dir_all(&logs_dir).await?;
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        for pod in pods {
            let pod_name = pod.name_any();
            for container in container_names(pod) {
                let params = LogParams {
                    container: Some(container.clone()),
                    tail_lines: Some(self.log_tail_lines),
                    timestamps: true,
                    ..Default::default()
                };
                match api.logs(&pod_name, &params).await {
                    Ok(log) => {
                        let file = logs_dir.join(format!("{pod_name}_{container}.log"));
                        tokio::fs::write(file, log).await?;
                    }
                    Err(e) => {
                        warn!(pod = %pod_name, container = %container, error = %e, "Failed to fetch container logs");
                    }
                }
            }
        }
        Ok(())
    }
}

impl DiagnosticsHook for ClusterDiagnostics {
    async fn capture(&self, ctx: &InstallationContext) -> Result<(), ClusterError> {
        let namespace = ctx.namespace();
        let dir = self.artifacts_dir.join(capture_dir_name(namespace, Timestamp::now()));
        tokio::fs::create_dir_all(&dir).await?;
        info!(namespace = %namespace, dir = %dir.display(), "Capturing failure diagnostics");

        let hint = DiagnosticHint::for_stage(Stage::Failed, namespace, &self.release);
        tokio::fs::write(dir.join("hints.txt"), hint.to_string()).await?;

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = pods.list(&ListParams::default()).await?.items;
        self.write_pods(&dir, &pods).await?;

        // Events and logs are independent; one failing does not skip the other
        let events = self.write_events(&dir, namespace).await;
        let logs = self.write_logs(&dir, namespace, &pods).await;

        info!(namespace = %namespace, pods = pods.len(), "Diagnostics captured");
        events.and(logs)
    }
}

/// Directory name for one capture
pub fn capture_dir_name(namespace: &str, at: Timestamp) -> String {
    format!("{}-{}", namespace, at.strftime("%Y%m%dT%H%M%SZ"))
}

fn container_names(pod: &Pod) -> Vec<String> {
    pod.spec
        .as_ref()
        .map(|spec| {
            spec.init_containers
                .iter()
                .flatten()
                .chain(spec.containers.iter())
                .map(|c| c.name.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn event_time(event: &Event) -> Option<Timestamp> {
    event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
        .or_else(|| event.first_timestamp.as_ref().map(|t| t.0))
}

fn render_event(event: &Event) -> String {
    let time = event_time(event)
        .map(|t| t.to_string())
        .unwrap_or_else(|| "-".to_string());
    let object = format!(
        "{}/{}",
        event.involved_object.kind.as_deref().unwrap_or("?"),
        event.involved_object.name.as_deref().unwrap_or("?")
    );
    format!(
        "{} {} {} {}: {}\n",
        time,
        event.type_.as_deref().unwrap_or("-"),
        event.reason.as_deref().unwrap_or("-"),
        object,
        event.message.as_deref().unwrap_or("")
    )
}
