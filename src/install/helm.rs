//! Helm-based installer for a local chart.
//!
//! Installs with `--create-namespace --atomic`. Helm rolls a failed release
//! back but leaves a namespace it created, so a failed install deletes the
//! namespace itself when it was not there beforehand. Uninstall removes the
//! release and then the install namespace, attempting both even if the first
//! step fails.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::Client;
use kube::api::{Api, DeleteParams, PropagationPolicy};
use tracing::{debug, info, warn};

use crate::cluster::command::run_command;
use crate::cluster::wait::wait_for_deletion;
use crate::context::InstallationContext;
use crate::error::ClusterError;
use crate::install::ComponentInstaller;

/// Default helm binary
pub const HELM: &str = "helm";

/// Default budget for helm operations
pub const DEFAULT_HELM_TIMEOUT: Duration = Duration::from_secs(300);

/// Namespace lookups and deletion around a helm release.
pub trait InstallNamespaces: Send + Sync {
    /// Whether the namespace currently exists
    fn exists(&self, name: &str) -> impl Future<Output = Result<bool, ClusterError>> + Send;

    /// Delete the namespace and wait for it to go. A missing namespace is not an error.
    fn delete(
        &self,
        name: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ClusterError>> + Send;
}

/// kube-rs implementation of [`InstallNamespaces`].
#[derive(Clone)]
pub struct KubeNamespaces {
    client: Client,
}

impl KubeNamespaces {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }
}

impl InstallNamespaces for KubeNamespaces {
    async fn exists(&self, name: &str) -> Result<bool, ClusterError> {
        Ok(self.api().get_opt(name).await?.is_some())
    }

    async fn delete(&self, name: &str, timeout: Duration) -> Result<(), ClusterError> {
        let ns_api = self.api();
        let dp = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };

        match ns_api.delete(name, &dp).await.map_err(ClusterError::from) {
            Ok(_) => {
                debug!(namespace = %name, "Namespace deletion initiated");
            }
            Err(e) if e.is_not_found() => {
                debug!(namespace = %name, "Namespace already deleted");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        wait_for_deletion(&ns_api, name, timeout).await?;
        info!(namespace = %name, "Deleted install namespace");
        Ok(())
    }
}

/// Installs the component from a chart directory with helm.
#[derive(Clone)]
pub struct HelmInstaller<N = KubeNamespaces> {
    release: String,
    chart: PathBuf,
    helm: String,
    timeout: Duration,
    /// Cleans up the install namespace; without it the namespace is left to the caller
    namespaces: Option<N>,
}

impl HelmInstaller {
    /// Create an installer for `chart` under release name `release`
    pub fn new(release: impl Into<String>, chart: impl Into<PathBuf>) -> Self {
        Self {
            release: release.into(),
            chart: chart.into(),
            helm: HELM.to_string(),
            timeout: DEFAULT_HELM_TIMEOUT,
            namespaces: None,
        }
    }

    /// Delete the install namespace through `client` after uninstalling the
    /// release or after an install that created it and failed
    pub fn with_namespace_cleanup(self, client: Client) -> Self {
        self.with_namespaces(KubeNamespaces::new(client))
    }
}

impl<N: InstallNamespaces> HelmInstaller<N> {
    /// Use `namespaces` for namespace lookups and deletion
    pub fn with_namespaces<M: InstallNamespaces>(self, namespaces: M) -> HelmInstaller<M> {
        HelmInstaller {
            release: self.release,
            chart: self.chart,
            helm: self.helm,
            timeout: self.timeout,
            namespaces: Some(namespaces),
        }
    }

    /// Set the budget for each helm operation
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a different helm binary
    pub fn with_helm(mut self, helm: impl Into<String>) -> Self {
        self.helm = helm.into();
        self
    }

    /// Release name
    pub fn release(&self) -> &str {
        &self.release
    }

    fn context_args(&self, ctx: &InstallationContext) -> Vec<String> {
        match &ctx.cluster().kube_context {
            Some(context) => vec!["--kube-context".to_string(), context.clone()],
            None => Vec::new(),
        }
    }

    /// Arguments for `helm upgrade --install`
    pub fn install_args(&self, ctx: &InstallationContext) -> Vec<String> {
        let mut args = self.context_args(ctx);
        args.extend([
            "upgrade".to_string(),
            "--install".to_string(),
            self.release.clone(),
            self.chart.display().to_string(),
            "--namespace".to_string(),
            ctx.namespace().to_string(),
            "--create-namespace".to_string(),
            "--atomic".to_string(),
            "--timeout".to_string(),
            format!("{}s", self.timeout.as_secs()),
        ]);
        for values in ctx.values_files() {
            args.push("-f".to_string());
            args.push(values.display().to_string());
        }
        args
    }

    /// Arguments for `helm uninstall`
    pub fn uninstall_args(&self, ctx: &InstallationContext) -> Vec<String> {
        let mut args = self.context_args(ctx);
        args.extend([
            "uninstall".to_string(),
            self.release.clone(),
            "--namespace".to_string(),
            ctx.namespace().to_string(),
            "--wait".to_string(),
            "--timeout".to_string(),
            format!("{}s", self.timeout.as_secs()),
        ]);
        args
    }
}

impl<N: InstallNamespaces> ComponentInstaller for HelmInstaller<N> {
    async fn install(&self, ctx: &InstallationContext) -> Result<(), ClusterError> {
        info!(
            release = %self.release,
            chart = %self.chart.display(),
            namespace = %ctx.namespace(),
            "Installing component"
        );

        // Nothing has been mutated yet, so a failed lookup can fail the install
        let created_by_helm = match &self.namespaces {
            Some(namespaces) => !namespaces.exists(ctx.namespace()).await?,
            None => false,
        };

        if let Err(e) = run_command(&self.helm, &self.install_args(ctx)).await {
            if created_by_helm && let Some(namespaces) = &self.namespaces {
                warn!(
                    namespace = %ctx.namespace(),
                    "Install failed, removing the namespace helm created"
                );
                if let Err(cleanup) = namespaces.delete(ctx.namespace(), self.timeout).await {
                    warn!(
                        namespace = %ctx.namespace(),
                        error = %cleanup,
                        "Failed to remove namespace after failed install"
                    );
                }
            }
            return Err(e);
        }

        info!(release = %self.release, "Component installed");
        Ok(())
    }

    async fn uninstall(&self, ctx: &InstallationContext) -> Result<(), ClusterError> {
        info!(release = %self.release, namespace = %ctx.namespace(), "Uninstalling component");
        let released = run_command(&self.helm, &self.uninstall_args(ctx)).await;
        if let Err(e) = &released {
            warn!(release = %self.release, error = %e, "helm uninstall failed");
        }

        let deleted = match &self.namespaces {
            Some(namespaces) => namespaces.delete(ctx.namespace(), self.timeout).await,
            None => Ok(()),
        };

        released?;
        deleted
    }
}
