//! Cluster access.
//!
//! The orchestrator talks to the cluster through [`ClusterClient`]. Every call
//! is a single attempt: errors go straight back to the caller.

use std::future::Future;
use std::time::Duration;

use crate::error::ClusterError;
use crate::manifest::ManifestReference;

pub(crate) mod command;
pub mod kubectl;
pub mod wait;

pub use kubectl::KubectlClient;
pub use wait::{namespace_is_active, wait_for_condition, wait_for_deletion};

/// Side-effecting operations against a live cluster.
pub trait ClusterClient: Send + Sync {
    /// Create or update every object in the manifest.
    fn apply_manifest(
        &self,
        manifest: &ManifestReference,
    ) -> impl Future<Output = Result<(), ClusterError>> + Send;

    /// Remove every object in the manifest.
    fn delete_manifest(
        &self,
        manifest: &ManifestReference,
    ) -> impl Future<Output = Result<(), ClusterError>> + Send;

    /// Block until the namespace is observably present, or `timeout` elapses.
    fn wait_for_namespace(
        &self,
        name: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ClusterError>> + Send;
}
