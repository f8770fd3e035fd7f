//! Installing the component under test.

use std::future::Future;

use crate::context::InstallationContext;
use crate::error::ClusterError;

pub mod helm;

pub use helm::{HelmInstaller, InstallNamespaces, KubeNamespaces};

/// Installs and removes the component under test.
pub trait ComponentInstaller: Send + Sync {
    /// Install the component into `ctx.namespace()`.
    ///
    /// An `Err` means nothing was left behind that needs uninstalling.
    fn install(
        &self,
        ctx: &InstallationContext,
    ) -> impl Future<Output = Result<(), ClusterError>> + Send;

    /// Remove everything `install` created.
    fn uninstall(
        &self,
        ctx: &InstallationContext,
    ) -> impl Future<Output = Result<(), ClusterError>> + Send;
}
