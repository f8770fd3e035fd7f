//! install-harness library crate
//!
//! Installs a control-plane component into a live cluster, hands the
//! installation to a test suite, and tears everything down again in reverse
//! order regardless of how the run ended.

pub mod cleanup;
pub mod cluster;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod env_guard;
pub mod error;
pub mod install;
pub mod lifecycle;
pub mod manifest;
pub mod suite;

pub use cleanup::{CleanupQueue, CleanupReport};
pub use cluster::{ClusterClient, KubectlClient};
pub use config::HarnessConfig;
pub use context::{ClusterHandle, InstallPlan, InstallationContext};
pub use diagnostics::{ClusterDiagnostics, DiagnosticHint, DiagnosticsHook, NoDiagnostics};
pub use env_guard::{EnvGuard, INSTALL_NAMESPACE_ENV};
pub use error::{ClusterError, Error, Result};
pub use install::{ComponentInstaller, HelmInstaller};
pub use lifecycle::{Orchestrator, RunError, RunReport, Stage};
pub use manifest::{ManifestReference, ManifestResolver};
pub use suite::{CommandSuiteRunner, SuiteOutcome, SuiteRunner};

use kube::Client;
use kube::config::{Config, KubeConfigOptions};

/// Build a client for `kube_context`, or the inferred config when `None`.
pub async fn kube_client(kube_context: Option<&str>) -> Result<Client> {
    let config = match kube_context {
        Some(context) => {
            let options = KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            };
            Config::from_kubeconfig(&options)
                .await
                .map_err(|e| Error::config(format!("kube context {context}: {e}")))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::config(format!("kubeconfig: {e}")))?,
    };
    Ok(Client::try_from(config)?)
}
