//! Error types for the installation harness.
//!
//! `ClusterError` is what collaborators (kubectl, helm, kube-rs watches, the
//! suite command) report. `Error` is the harness-level taxonomy: which stage
//! of a run failed and why.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure reported by a cluster-facing collaborator.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// An external command exited unsuccessfully
    #[error("command failed: {command} - {message}")]
    CommandFailed { command: String, message: String },

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Watch stream error
    #[error("Watcher error: {0}")]
    Watcher(#[from] kube::runtime::watcher::Error),

    /// A wait did not observe its condition in time
    #[error("Timeout waiting for condition after {0:?}")]
    Timeout(Duration),

    /// The watched resource disappeared while waiting for it
    #[error("Resource was deleted while waiting")]
    ResourceDeleted,

    /// The watch stream ended before the condition was observed
    #[error("Watch stream ended unexpectedly")]
    StreamEnded,

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClusterError {
    /// Create a command failure from a command line and its stderr
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error is a wait that ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClusterError::Timeout(_))
    }
}

/// Error type for a harness run
#[derive(Error, Debug)]
pub enum Error {
    /// The prerequisite manifest (CRDs) could not be applied
    #[error("failed to apply prerequisite manifest {}: {source}", path.display())]
    PrerequisiteApply {
        path: PathBuf,
        #[source]
        source: ClusterError,
    },

    /// The component under test could not be installed
    #[error("failed to install component into namespace {namespace}: {source}")]
    Install {
        namespace: String,
        #[source]
        source: ClusterError,
    },

    /// The install namespace never became observable
    #[error("namespace {namespace} did not become ready: {source}")]
    ReadinessTimeout {
        namespace: String,
        #[source]
        source: ClusterError,
    },

    /// The suite ran to completion and reported failure
    #[error("test suite failed: {reason}")]
    SuiteFailure { reason: String },

    /// A panic escaped a setup stage or the suite
    #[error("panic during {stage}: {message}")]
    Panicked { stage: String, message: String },

    /// A teardown action failed
    #[error("cleanup action '{action}' failed: {source}")]
    Cleanup {
        action: String,
        #[source]
        source: ClusterError,
    },

    /// A teardown action panicked
    #[error("cleanup action '{action}' panicked: {message}")]
    CleanupPanicked { action: String, message: String },

    /// Invalid harness configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kubernetes client setup error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error came out of teardown rather than setup
    pub fn is_cleanup(&self) -> bool {
        matches!(self, Error::Cleanup { .. } | Error::CleanupPanicked { .. })
    }

    /// Check if this error aborts setup (as opposed to a reported suite failure)
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Error::PrerequisiteApply { .. }
                | Error::Install { .. }
                | Error::ReadinessTimeout { .. }
                | Error::Panicked { .. }
        )
    }
}

/// Extract a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, Error>;
