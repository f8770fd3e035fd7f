//! Test fixtures and builder patterns for install plans.

use std::path::PathBuf;
use std::time::Duration;

use install_harness::{ClusterHandle, InstallPlan, ManifestReference};

/// Environment key no other test uses.
///
/// The namespace variable is process-wide, so every run in a test binary gets
/// its own key.
pub fn unique_env_key() -> String {
    format!("HARNESS_TEST_NS_{}", uuid::Uuid::new_v4().simple())
}

/// Builder for creating InstallPlan test fixtures.
///
/// # Example
/// ```
/// let plan = InstallPlanBuilder::new()
///     .default_namespace("gw-test")
///     .values("agent-gateway-integration.yaml")
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct InstallPlanBuilder {
    namespace_env: String,
    default_namespace: String,
    prerequisite_manifest: PathBuf,
    profile_values: Option<PathBuf>,
    values: Vec<PathBuf>,
    cluster: ClusterHandle,
    readiness_timeout: Duration,
}

impl Default for InstallPlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallPlanBuilder {
    /// Create a builder with a fresh environment key.
    pub fn new() -> Self {
        Self {
            namespace_env: unique_env_key(),
            default_namespace: "agent-gateway-test".to_string(),
            prerequisite_manifest: PathBuf::from("/crds/inference-crds.yaml"),
            profile_values: None,
            values: Vec::new(),
            cluster: ClusterHandle::kind("e2e"),
            readiness_timeout: Duration::from_secs(5),
        }
    }

    /// Set the environment key.
    pub fn namespace_env(mut self, key: impl Into<String>) -> Self {
        self.namespace_env = key.into();
        self
    }

    /// Set the default namespace.
    pub fn default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    /// Set the prerequisite manifest path.
    pub fn prerequisite_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.prerequisite_manifest = path.into();
        self
    }

    /// Set the profile values file.
    pub fn profile_values(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_values = Some(path.into());
        self
    }

    /// Add a values file.
    pub fn values(mut self, path: impl Into<PathBuf>) -> Self {
        self.values.push(path.into());
        self
    }

    /// Set the target cluster.
    pub fn cluster(mut self, cluster: ClusterHandle) -> Self {
        self.cluster = cluster;
        self
    }

    /// Set the readiness budget.
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Build the plan.
    pub fn build(self) -> InstallPlan {
        let mut plan = InstallPlan::new(
            self.default_namespace,
            ManifestReference::new(self.prerequisite_manifest),
            self.cluster,
        );
        plan.namespace_env = self.namespace_env;
        plan.profile_values = self.profile_values;
        plan.values = self.values;
        plan.readiness_timeout = self.readiness_timeout;
        plan
    }
}
