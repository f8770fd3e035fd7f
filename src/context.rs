//! Installation context for a single harness run.
//!
//! An `InstallPlan` describes what to install before the namespace is known.
//! Once the namespace environment variable has been acquired, the plan is
//! frozen into an `InstallationContext` that every collaborator receives.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::env_guard::INSTALL_NAMESPACE_ENV;
use crate::manifest::ManifestReference;

/// Default wait budget for the install namespace to appear
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(120);

/// Identifies the cluster a run targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterHandle {
    /// Cluster name (for kind clusters, the name passed to `kind create cluster`)
    pub name: String,
    /// kubeconfig context used to reach the cluster, if not the current one
    pub kube_context: Option<String>,
}

impl ClusterHandle {
    /// Handle for a kind cluster, whose kubeconfig context is `kind-<name>`
    pub fn kind(name: impl Into<String>) -> Self {
        let name = name.into();
        let kube_context = Some(format!("kind-{name}"));
        Self { name, kube_context }
    }

    /// Handle using the current kubeconfig context
    pub fn current(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kube_context: None,
        }
    }
}

/// Everything needed to start a run, before the namespace is resolved.
#[derive(Debug, Clone)]
pub struct InstallPlan {
    /// Environment key carrying the namespace override
    pub namespace_env: String,
    /// Namespace used when the environment does not supply one
    pub default_namespace: String,
    /// Cluster-scoped prerequisites (CRDs) applied before the install
    pub prerequisite_manifest: ManifestReference,
    /// Profile values layered first
    pub profile_values: Option<PathBuf>,
    /// Test-specific values layered on top of the profile
    pub values: Vec<PathBuf>,
    /// Target cluster
    pub cluster: ClusterHandle,
    /// Wait budget for the install namespace
    pub readiness_timeout: Duration,
}

impl InstallPlan {
    /// Create a plan with the default environment key and readiness budget
    pub fn new(
        default_namespace: impl Into<String>,
        prerequisite_manifest: ManifestReference,
        cluster: ClusterHandle,
    ) -> Self {
        Self {
            namespace_env: INSTALL_NAMESPACE_ENV.to_string(),
            default_namespace: default_namespace.into(),
            prerequisite_manifest,
            profile_values: None,
            values: Vec::new(),
            cluster,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
        }
    }

    /// Freeze the plan into a context for `namespace`
    pub fn build_context(&self, namespace: &str) -> InstallationContext {
        let values_files = self
            .profile_values
            .iter()
            .chain(self.values.iter())
            .cloned()
            .collect();

        InstallationContext {
            namespace: namespace.to_string(),
            prerequisite_manifest: self.prerequisite_manifest.clone(),
            values_files,
            cluster: self.cluster.clone(),
            readiness_timeout: self.readiness_timeout,
        }
    }
}

/// Immutable description of one installation under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationContext {
    namespace: String,
    prerequisite_manifest: ManifestReference,
    values_files: Vec<PathBuf>,
    cluster: ClusterHandle,
    readiness_timeout: Duration,
}

impl InstallationContext {
    /// Namespace the component is installed into
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Prerequisite manifest applied before the install
    pub fn prerequisite_manifest(&self) -> &ManifestReference {
        &self.prerequisite_manifest
    }

    /// Values files in layering order (profile first)
    pub fn values_files(&self) -> &[PathBuf] {
        &self.values_files
    }

    /// Target cluster
    pub fn cluster(&self) -> &ClusterHandle {
        &self.cluster
    }

    /// Wait budget for the install namespace
    pub fn readiness_timeout(&self) -> Duration {
        self.readiness_timeout
    }
}
