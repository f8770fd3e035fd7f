//! Harness configuration.
//!
//! Everything is read from `HARNESS_*` environment variables. Only the chart
//! and the suite command are required; the rest default to the layout of a
//! kind-based e2e run.

use std::path::PathBuf;
use std::time::Duration;

use crate::context::{ClusterHandle, DEFAULT_READINESS_TIMEOUT, InstallPlan};
use crate::env_guard::INSTALL_NAMESPACE_ENV;
use crate::error::{Error, Result};
use crate::cluster::kubectl::KUBECTL;
use crate::diagnostics::capture::DEFAULT_LOG_TAIL_LINES;
use crate::install::helm::{DEFAULT_HELM_TIMEOUT, HELM};
use crate::manifest::ManifestResolver;
use crate::suite::CommandSuiteRunner;

pub const CLUSTER_NAME: &str = "HARNESS_CLUSTER_NAME";
pub const KUBE_CONTEXT: &str = "HARNESS_KUBE_CONTEXT";
pub const NAMESPACE_ENV: &str = "HARNESS_NAMESPACE_ENV";
pub const DEFAULT_NAMESPACE: &str = "HARNESS_DEFAULT_NAMESPACE";
pub const CRD_DIR: &str = "HARNESS_CRD_DIR";
pub const MANIFEST_DIR: &str = "HARNESS_MANIFEST_DIR";
pub const PREREQ_MANIFEST: &str = "HARNESS_PREREQ_MANIFEST";
pub const PROFILE_VALUES: &str = "HARNESS_PROFILE_VALUES";
pub const VALUES: &str = "HARNESS_VALUES";
pub const CHART: &str = "HARNESS_CHART";
pub const RELEASE: &str = "HARNESS_RELEASE";
pub const READINESS_TIMEOUT_SECS: &str = "HARNESS_READINESS_TIMEOUT_SECS";
pub const INSTALL_TIMEOUT_SECS: &str = "HARNESS_INSTALL_TIMEOUT_SECS";
pub const ARTIFACTS_DIR: &str = "HARNESS_ARTIFACTS_DIR";
pub const SUITE_COMMAND: &str = "HARNESS_SUITE_COMMAND";
pub const KUBECTL_BIN: &str = "HARNESS_KUBECTL";
pub const HELM_BIN: &str = "HARNESS_HELM";
pub const LOG_TAIL_LINES: &str = "HARNESS_LOG_TAIL_LINES";

/// Resolved harness configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Name of the kind cluster
    pub cluster_name: String,
    /// Explicit kube context. `None` means the current context.
    pub kube_context: Option<String>,
    /// Environment key carrying the install namespace
    pub namespace_env: String,
    /// Namespace used when `namespace_env` is unset
    pub default_namespace: String,
    pub crd_dir: PathBuf,
    pub manifest_dir: PathBuf,
    /// Prerequisite manifest file name, under `crd_dir`
    pub prerequisite_manifest: String,
    /// Profile values file name, under `manifest_dir`
    pub profile_values: Option<String>,
    /// Values file names under `manifest_dir`, layered in order
    pub values: Vec<String>,
    /// Local chart directory
    pub chart: PathBuf,
    pub release: String,
    pub readiness_timeout: Duration,
    /// Budget for each helm operation
    pub install_timeout: Duration,
    /// Where diagnostics and the run summary are written
    pub artifacts_dir: PathBuf,
    /// Command line of the test suite
    pub suite_command: String,
    pub kubectl: String,
    pub helm: String,
    /// Log lines captured per container on failure
    pub log_tail_lines: i64,
}

impl HarnessConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to read each key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let cluster_name = get(CLUSTER_NAME, "kind");
        // Unset means the kind context for the cluster; set but empty means the current context
        let kube_context = match lookup(KUBE_CONTEXT) {
            None => Some(format!("kind-{cluster_name}")),
            Some(context) if context.is_empty() => None,
            Some(context) => Some(context),
        };

        let chart = lookup(CHART)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::config(format!("{CHART} must be set")))?;
        let suite_command = lookup(SUITE_COMMAND)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::config(format!("{SUITE_COMMAND} must be set")))?;

        let values = lookup(VALUES)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            kube_context,
            namespace_env: get(NAMESPACE_ENV, INSTALL_NAMESPACE_ENV),
            default_namespace: get(DEFAULT_NAMESPACE, "agent-gateway-test"),
            crd_dir: PathBuf::from(get(CRD_DIR, "crds")),
            manifest_dir: PathBuf::from(get(MANIFEST_DIR, "test/e2e/manifests")),
            prerequisite_manifest: get(PREREQ_MANIFEST, "inference-crds.yaml"),
            profile_values: lookup(PROFILE_VALUES).filter(|p| !p.is_empty()),
            values,
            chart: PathBuf::from(chart),
            release: get(RELEASE, "kgateway"),
            readiness_timeout: seconds(&lookup, READINESS_TIMEOUT_SECS, DEFAULT_READINESS_TIMEOUT)?,
            install_timeout: seconds(&lookup, INSTALL_TIMEOUT_SECS, DEFAULT_HELM_TIMEOUT)?,
            artifacts_dir: PathBuf::from(get(ARTIFACTS_DIR, "_output/diagnostics")),
            suite_command,
            kubectl: get(KUBECTL_BIN, KUBECTL),
            helm: get(HELM_BIN, HELM),
            log_tail_lines: log_tail_lines(&lookup)?,
            cluster_name,
        })
    }

    /// Cluster the run targets
    pub fn cluster(&self) -> ClusterHandle {
        ClusterHandle {
            name: self.cluster_name.clone(),
            kube_context: self.kube_context.clone(),
        }
    }

    /// Build the install plan described by this configuration
    pub fn install_plan(&self) -> InstallPlan {
        let resolver = ManifestResolver::new(&self.crd_dir, &self.manifest_dir);

        let mut plan = InstallPlan::new(
            &self.default_namespace,
            resolver.crd(&self.prerequisite_manifest),
            self.cluster(),
        );
        plan.namespace_env = self.namespace_env.clone();
        plan.profile_values = self
            .profile_values
            .as_ref()
            .map(|p| resolver.manifest(p).path().to_path_buf());
        plan.values = self
            .values
            .iter()
            .map(|v| resolver.manifest(v).path().to_path_buf())
            .collect();
        plan.readiness_timeout = self.readiness_timeout;
        plan
    }

    /// Runner for the configured suite command
    pub fn suite_runner(&self) -> Result<CommandSuiteRunner> {
        CommandSuiteRunner::from_command_line(&self.suite_command, &self.namespace_env)
            .ok_or_else(|| Error::config(format!("{SUITE_COMMAND} is blank")))
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| Error::config(format!("{key}={raw:?} is not a number of seconds: {e}"))),
    }
}

fn log_tail_lines(lookup: &impl Fn(&str) -> Option<String>) -> Result<i64> {
    match lookup(LOG_TAIL_LINES) {
        None => Ok(DEFAULT_LOG_TAIL_LINES),
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(lines) if lines > 0 => Ok(lines),
            _ => Err(Error::config(format!(
                "{LOG_TAIL_LINES}={raw:?} is not a positive line count"
            ))),
        },
    }
}
