//! Cluster client backed by kubectl and kube-rs.
//!
//! Manifests go through `kubectl apply -f` / `kubectl delete -f`, so the
//! harness never has to understand their contents. Namespace readiness uses a
//! kube-rs watch.

use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Client};
use tracing::info;

use crate::cluster::ClusterClient;
use crate::cluster::command::run_command;
use crate::cluster::wait::{namespace_is_active, wait_for_condition};
use crate::error::ClusterError;
use crate::manifest::{ManifestOp, ManifestReference};

/// Default kubectl binary
pub const KUBECTL: &str = "kubectl";

/// kubectl + kube-rs implementation of [`ClusterClient`].
#[derive(Clone)]
pub struct KubectlClient {
    client: Client,
    kube_context: Option<String>,
    kubectl: String,
}

impl KubectlClient {
    /// Create a client using the current kubeconfig context for kubectl
    pub fn new(client: Client) -> Self {
        Self {
            client,
            kube_context: None,
            kubectl: KUBECTL.to_string(),
        }
    }

    /// Pin kubectl to a kubeconfig context
    pub fn with_context(mut self, kube_context: Option<String>) -> Self {
        self.kube_context = kube_context;
        self
    }

    /// Use a different kubectl binary
    pub fn with_kubectl(mut self, kubectl: impl Into<String>) -> Self {
        self.kubectl = kubectl.into();
        self
    }

    fn manifest_args(&self, manifest: &ManifestReference, op: ManifestOp) -> Vec<String> {
        kubectl_args(self.kube_context.as_deref(), manifest.kubectl_args(op))
    }

    async fn run_manifest(
        &self,
        manifest: &ManifestReference,
        op: ManifestOp,
    ) -> Result<(), ClusterError> {
        let args = self.manifest_args(manifest, op);
        let output = run_command(&self.kubectl, &args).await?;
        info!(
            manifest = %manifest,
            operation = %op,
            objects = output.lines().count(),
            "Manifest {}",
            if op == ManifestOp::Apply { "applied" } else { "deleted" }
        );
        Ok(())
    }
}

/// Prefix kubectl arguments with `--context` when one is pinned
pub(crate) fn kubectl_args(kube_context: Option<&str>, rest: Vec<String>) -> Vec<String> {
    let mut args = Vec::with_capacity(rest.len() + 2);
    if let Some(context) = kube_context {
        args.push("--context".to_string());
        args.push(context.to_string());
    }
    args.extend(rest);
    args
}

impl ClusterClient for KubectlClient {
    async fn apply_manifest(&self, manifest: &ManifestReference) -> Result<(), ClusterError> {
        self.run_manifest(manifest, ManifestOp::Apply).await
    }

    async fn delete_manifest(&self, manifest: &ManifestReference) -> Result<(), ClusterError> {
        self.run_manifest(manifest, ManifestOp::Delete).await
    }

    async fn wait_for_namespace(&self, name: &str, timeout: Duration) -> Result<(), ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        info!(namespace = %name, ?timeout, "Waiting for namespace");
        wait_for_condition(&api, name, namespace_is_active, timeout).await?;
        info!(namespace = %name, "Namespace is active");
        Ok(())
    }
}
