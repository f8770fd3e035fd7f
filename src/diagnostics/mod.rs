//! Failure diagnostics.
//!
//! The hook runs only when the suite failed, before any teardown action, so
//! it sees the cluster exactly as the suite left it.

use std::future::Future;

use crate::context::InstallationContext;
use crate::error::ClusterError;

pub mod capture;
pub mod hints;

pub use capture::ClusterDiagnostics;
pub use hints::{DiagnosticCommand, DiagnosticHint};

/// Captures cluster state for a failed run.
pub trait DiagnosticsHook: Send + Sync {
    /// Capture whatever helps explain the failure. Best effort: an error here
    /// is logged by the caller and never blocks teardown.
    fn capture(
        &self,
        ctx: &InstallationContext,
    ) -> impl Future<Output = Result<(), ClusterError>> + Send;
}

/// Diagnostics hook that captures nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiagnostics;

impl DiagnosticsHook for NoDiagnostics {
    async fn capture(&self, _ctx: &InstallationContext) -> Result<(), ClusterError> {
        Ok(())
    }
}
