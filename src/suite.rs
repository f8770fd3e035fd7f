//! Suite runners.
//!
//! The suite is opaque to the harness: it gets the installation context and
//! reports whether it passed.

use std::fmt;
use std::future::Future;

use serde::Serialize;
use tracing::{info, warn};

use crate::cluster::command::{command_line, run_command_streaming};
use crate::context::InstallationContext;

/// Result of running a suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum SuiteOutcome {
    /// Every check passed
    Passed,
    /// At least one check failed
    Failed { reason: String },
}

impl SuiteOutcome {
    /// Create a failed outcome with the given reason
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Whether the suite reported failure
    pub fn is_failed(&self) -> bool {
        matches!(self, SuiteOutcome::Failed { .. })
    }
}

impl fmt::Display for SuiteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuiteOutcome::Passed => write!(f, "passed"),
            SuiteOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Runs the behavioral checks against an installation.
pub trait SuiteRunner: Send + Sync {
    /// Run the suite to completion.
    fn run(&self, ctx: &InstallationContext) -> impl Future<Output = SuiteOutcome> + Send;
}

/// Runs an external test command as the suite.
///
/// The command sees the install namespace under `namespace_env` and the kube
/// context (if any) under `KUBE_CONTEXT`. Exit status zero means passed.
#[derive(Debug, Clone)]
pub struct CommandSuiteRunner {
    program: String,
    args: Vec<String>,
    namespace_env: String,
}

impl CommandSuiteRunner {
    /// Create a runner for `program args...`
    pub fn new(program: impl Into<String>, args: Vec<String>, namespace_env: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            namespace_env: namespace_env.into(),
        }
    }

    /// Parse a whitespace-separated command line. Returns `None` if it is blank.
    pub fn from_command_line(line: &str, namespace_env: impl Into<String>) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect(), namespace_env))
    }

    /// Environment handed to the suite command
    pub fn environment(&self, ctx: &InstallationContext) -> Vec<(String, String)> {
        let mut env = vec![(self.namespace_env.clone(), ctx.namespace().to_string())];
        if let Some(context) = &ctx.cluster().kube_context {
            env.push(("KUBE_CONTEXT".to_string(), context.clone()));
        }
        env
    }
}

impl SuiteRunner for CommandSuiteRunner {
    async fn run(&self, ctx: &InstallationContext) -> SuiteOutcome {
        let line = command_line(&self.program, &self.args);
        info!(command = %line, namespace = %ctx.namespace(), "Running test suite");

        match run_command_streaming(&self.program, &self.args, &self.environment(ctx)).await {
            Ok(output) if output.status.success() => SuiteOutcome::Passed,
            Ok(output) => {
                let mut reason = format!("{line} exited with {}", output.status);
                if let Some(last) = output.stderr_tail.last() {
                    reason.push_str(": ");
                    reason.push_str(last);
                }
                warn!(reason = %reason, "Test suite failed");
                SuiteOutcome::Failed { reason }
            }
            Err(e) => {
                warn!(command = %line, error = %e, "Test suite could not be started");
                SuiteOutcome::failed(format!("could not run {line}: {e}"))
            }
        }
    }
}
