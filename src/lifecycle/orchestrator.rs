//! Drives one harness run from environment acquisition to teardown.
//!
//! Setup walks the stage table in order. Every successful mutation queues its
//! inverse before the next await, so whatever point setup stops at (error,
//! suite failure, panic) the queue holds exactly what needs undoing.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::time::Duration;

use futures::FutureExt;
use jiff::Timestamp;
use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::cleanup::{CleanupQueue, CleanupReport};
use crate::cluster::ClusterClient;
use crate::context::{InstallPlan, InstallationContext};
use crate::diagnostics::{DiagnosticHint, DiagnosticsHook};
use crate::env_guard::EnvGuard;
use crate::error::{Error, panic_message};
use crate::install::ComponentInstaller;
use crate::lifecycle::state_machine::{
    LifecycleEvent, LifecycleStateMachine, Stage, TransitionContext, TransitionResult,
};
use crate::suite::{SuiteOutcome, SuiteRunner};

/// Cleanup action restoring the namespace environment variable
pub const RESTORE_NAMESPACE_ENV: &str = "restore-namespace-env";
/// Cleanup action deleting the prerequisite manifest
pub const DELETE_PREREQUISITE: &str = "delete-prerequisite-manifest";
/// Cleanup action uninstalling the component
pub const UNINSTALL_COMPONENT: &str = "uninstall-component";

/// Runs install, suite and teardown against one set of collaborators.
pub struct Orchestrator<C, I, S, D> {
    cluster: C,
    installer: I,
    suite: S,
    diagnostics: D,
    component: String,
    state_machine: LifecycleStateMachine,
}

impl<C, I, S, D> Orchestrator<C, I, S, D>
where
    C: ClusterClient,
    I: ComponentInstaller,
    S: SuiteRunner,
    D: DiagnosticsHook,
{
    /// Create an orchestrator over the given collaborators
    pub fn new(cluster: C, installer: I, suite: S, diagnostics: D) -> Self {
        Self {
            cluster,
            installer,
            suite,
            diagnostics,
            component: "component".to_string(),
            state_machine: LifecycleStateMachine::new(),
        }
    }

    /// Name used for the component in logged hints (the helm release, usually)
    pub fn with_component_name(mut self, name: impl Into<String>) -> Self {
        self.component = name.into();
        self
    }

    /// Execute one run.
    ///
    /// Teardown always runs to completion. If setup or the suite panicked, the
    /// panic is resumed once teardown has finished; otherwise the outcome is
    /// in the returned report.
    pub async fn run(&self, plan: &InstallPlan) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let guard = EnvGuard::acquire(&plan.namespace_env, &plan.default_namespace);
        let ctx = plan.build_context(guard.value());

        let span = info_span!("installation", run_id = %run_id, namespace = %ctx.namespace());
        self.execute(run_id, guard, &ctx).instrument(span).await
    }

    async fn execute(&self, run_id: String, guard: EnvGuard, ctx: &InstallationContext) -> RunReport {
        let started_at = Timestamp::now();
        let clock = tokio::time::Instant::now();
        info!(
            env = %guard.name(),
            predefined = guard.was_predefined(),
            "Starting installation run"
        );

        let mut tracker = StageTracker::new(&self.state_machine);
        let mut queue = CleanupQueue::new();
        queue.register(RESTORE_NAMESPACE_ENV, move || async move {
            let mut guard = guard;
            guard.release();
            Ok(())
        });

        let setup = AssertUnwindSafe(self.setup(ctx, &mut queue, &mut tracker))
            .catch_unwind()
            .await;

        let mut panic: Option<Box<dyn Any + Send>> = None;
        let (error, suite_outcome) = match setup {
            Ok(Ok(outcome)) => {
                let error = match &outcome {
                    SuiteOutcome::Passed => None,
                    SuiteOutcome::Failed { reason } => Some(Error::SuiteFailure {
                        reason: reason.clone(),
                    }),
                };
                (error, Some(outcome))
            }
            Ok(Err(e)) => {
                error!(stage = %tracker.current(), error = %e, "Setup failed");
                (Some(e), None)
            }
            Err(payload) => {
                let stage = tracker.current();
                let message = panic_message(&*payload);
                error!(stage = %stage, panic = %message, "Panic during run");
                panic = Some(payload);

                // A panicking suite is a failed suite
                let outcome = if stage == Stage::SuiteRunning {
                    tracker.fire(LifecycleEvent::SuiteFailed);
                    Some(SuiteOutcome::failed(format!("suite panicked: {message}")))
                } else {
                    None
                };
                let error = Error::Panicked {
                    stage: stage.to_string(),
                    message,
                };
                (Some(error), outcome)
            }
        };

        if let Some(e) = &error
            && e.is_setup_failure()
            && tracker.current() != Stage::Failed
        {
            let hint = DiagnosticHint::for_stage(tracker.current(), ctx.namespace(), &self.component);
            warn!(stage = %tracker.current(), "Setup failed before the suite ran\n{hint}");
        }

        let diagnostics = if tracker.current() == Stage::Failed {
            self.capture_diagnostics(ctx, &mut tracker).await
        } else {
            DiagnosticsStatus::Skipped
        };

        tracker.fire(LifecycleEvent::TeardownStarted);
        let cleanup = queue.run_all().await;
        tracker.fire(LifecycleEvent::TeardownFinished);

        let report = RunReport {
            run_id,
            namespace: ctx.namespace().to_string(),
            stages: tracker.history,
            final_stage: tracker.current,
            error,
            suite_outcome,
            cleanup,
            diagnostics,
            started_at,
            duration: clock.elapsed(),
        };

        if let Some(payload) = panic {
            error!(cleanup_errors = report.cleanup.errors.len(), "Teardown finished, resuming panic");
            resume_unwind(payload);
        }

        match report.primary_error() {
            None => info!(duration_ms = report.duration.as_millis() as u64, "Installation run passed"),
            Some(e) => warn!(
                error = %e,
                cleanup_errors = report.cleanup.errors.len(),
                "Installation run failed"
            ),
        }
        report
    }

    async fn setup<'a>(
        &'a self,
        ctx: &'a InstallationContext,
        queue: &mut CleanupQueue<'a>,
        tracker: &mut StageTracker<'_>,
    ) -> Result<SuiteOutcome, Error> {
        let cluster = &self.cluster;
        let installer = &self.installer;

        let manifest = ctx.prerequisite_manifest();
        info!(manifest = %manifest, "Applying prerequisite manifest");
        cluster
            .apply_manifest(manifest)
            .await
            .map_err(|source| Error::PrerequisiteApply {
                path: manifest.path().to_path_buf(),
                source,
            })?;
        queue.register(DELETE_PREREQUISITE, move || cluster.delete_manifest(manifest));
        tracker.flags.prerequisite_cleanup_registered = true;
        tracker.fire(LifecycleEvent::PrerequisiteApplied);

        tracker.fire(LifecycleEvent::InstallStarted);
        info!(values = ctx.values_files().len(), "Installing component");
        installer
            .install(ctx)
            .await
            .map_err(|source| Error::Install {
                namespace: ctx.namespace().to_string(),
                source,
            })?;
        queue.register(UNINSTALL_COMPONENT, move || installer.uninstall(ctx));
        tracker.flags.uninstall_registered = true;

        debug!(timeout_secs = ctx.readiness_timeout().as_secs(), "Waiting for install namespace");
        cluster
            .wait_for_namespace(ctx.namespace(), ctx.readiness_timeout())
            .await
            .map_err(|source| Error::ReadinessTimeout {
                namespace: ctx.namespace().to_string(),
                source,
            })?;
        tracker.fire(LifecycleEvent::NamespaceReady);

        tracker.fire(LifecycleEvent::SuiteStarted);
        let outcome = self.suite.run(ctx).await;
        match &outcome {
            SuiteOutcome::Passed => {
                info!("Test suite passed");
                tracker.fire(LifecycleEvent::SuitePassed);
            }
            SuiteOutcome::Failed { reason } => {
                warn!(reason = %reason, "Test suite failed");
                tracker.fire(LifecycleEvent::SuiteFailed);
            }
        }
        Ok(outcome)
    }

    async fn capture_diagnostics(
        &self,
        ctx: &InstallationContext,
        tracker: &mut StageTracker<'_>,
    ) -> DiagnosticsStatus {
        info!("Capturing diagnostics before teardown");
        let result = AssertUnwindSafe(self.diagnostics.capture(ctx))
            .catch_unwind()
            .await;
        tracker.flags.diagnostics_attempted = true;

        match result {
            Ok(Ok(())) => DiagnosticsStatus::Captured,
            Ok(Err(e)) => {
                warn!(error = %e, "Diagnostics capture failed");
                DiagnosticsStatus::Failed {
                    reason: e.to_string(),
                }
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                warn!(panic = %message, "Diagnostics capture panicked");
                DiagnosticsStatus::Failed {
                    reason: format!("panicked: {message}"),
                }
            }
        }
    }
}

/// Current stage plus the history of every stage entered.
struct StageTracker<'m> {
    machine: &'m LifecycleStateMachine,
    current: Stage,
    history: Vec<Stage>,
    flags: TransitionContext,
}

impl<'m> StageTracker<'m> {
    fn new(machine: &'m LifecycleStateMachine) -> Self {
        Self {
            machine,
            current: Stage::Idle,
            history: vec![Stage::Idle],
            flags: TransitionContext::new(),
        }
    }

    fn current(&self) -> Stage {
        self.current
    }

    fn fire(&mut self, event: LifecycleEvent) {
        match self.machine.transition(&self.current, event, &self.flags) {
            TransitionResult::Success {
                from,
                to,
                description,
                ..
            } => {
                debug!(from = %from, to = %to, "{description}");
                self.current = to;
                self.history.push(to);
            }
            TransitionResult::InvalidTransition { current, event } => {
                warn!(stage = %current, event = %event, "Rejected stage transition");
            }
            TransitionResult::GuardFailed {
                from,
                to,
                event,
                reason,
            } => {
                warn!(from = %from, to = %to, event = %event, reason = %reason, "Stage transition guard failed");
            }
        }
    }
}

/// Whether failure diagnostics were captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DiagnosticsStatus {
    /// The suite did not fail, so nothing was captured
    Skipped,
    /// The hook completed
    Captured,
    /// The hook returned an error or panicked
    Failed { reason: String },
}

impl DiagnosticsStatus {
    /// Whether the hook ran at all
    pub fn attempted(&self) -> bool {
        !matches!(self, DiagnosticsStatus::Skipped)
    }
}

/// Everything a run did.
#[derive(Debug)]
pub struct RunReport {
    /// Unique id for the run
    pub run_id: String,
    /// Namespace the component was installed into
    pub namespace: String,
    /// Every stage entered, in order, starting with `Idle`
    pub stages: Vec<Stage>,
    /// Stage at the end of the run
    pub final_stage: Stage,
    /// Setup error or suite failure, if any
    pub error: Option<Error>,
    /// The suite's result, if it ran
    pub suite_outcome: Option<SuiteOutcome>,
    /// Teardown results
    pub cleanup: CleanupReport,
    /// Diagnostics status
    pub diagnostics: DiagnosticsStatus,
    /// When the run started
    pub started_at: Timestamp,
    /// Wall time of the whole run
    pub duration: Duration,
}

impl RunReport {
    /// Whether the run passed with a clean teardown
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.cleanup.is_clean()
    }

    /// The error that best explains the run's failure.
    ///
    /// Setup errors win over suite failures, which win over cleanup errors.
    pub fn primary_error(&self) -> Option<&Error> {
        self.error.as_ref().or_else(|| self.cleanup.first_error())
    }

    /// Serializable view of the report
    pub fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            run_id: &self.run_id,
            namespace: &self.namespace,
            passed: self.is_success(),
            stages: &self.stages,
            final_stage: self.final_stage,
            error: self.primary_error().map(ToString::to_string),
            suite: self.suite_outcome.as_ref(),
            diagnostics: &self.diagnostics,
            cleanup: &self.cleanup,
            started_at: self.started_at,
            duration_ms: self.duration.as_millis() as u64,
        }
    }

    /// Collapse the report into a result.
    pub fn into_result(self) -> Result<(), RunError> {
        let RunReport { error, cleanup, .. } = self;
        let mut cleanup_errors = cleanup.errors.into_iter();

        let primary = match error {
            Some(e) => e,
            None => match cleanup_errors.next() {
                Some(e) => e,
                None => return Ok(()),
            },
        };
        Err(RunError {
            primary,
            secondary: cleanup_errors.collect(),
        })
    }
}

/// JSON summary of a run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary<'a> {
    pub run_id: &'a str,
    pub namespace: &'a str,
    pub passed: bool,
    pub stages: &'a [Stage],
    pub final_stage: Stage,
    pub error: Option<String>,
    pub suite: Option<&'a SuiteOutcome>,
    pub diagnostics: &'a DiagnosticsStatus,
    pub cleanup: &'a CleanupReport,
    pub started_at: Timestamp,
    pub duration_ms: u64,
}

/// A failed run: the primary error plus any cleanup errors behind it.
#[derive(Debug)]
pub struct RunError {
    primary: Error,
    secondary: Vec<Error>,
}

impl RunError {
    /// The error that explains the failure
    pub fn primary(&self) -> &Error {
        &self.primary
    }

    /// Cleanup errors observed in addition to the primary error
    pub fn secondary(&self) -> &[Error] {
        &self.secondary
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if !self.secondary.is_empty() {
            write!(f, " (and {} cleanup error(s):", self.secondary.len())?;
            for e in &self.secondary {
                write!(f, " {e};")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.primary)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::error::ClusterError;

    fn report(error: Option<Error>, cleanup_errors: Vec<Error>) -> RunReport {
        RunReport {
            run_id: "run".to_string(),
            namespace: "gw-test".to_string(),
            stages: vec![Stage::Idle, Stage::TearingDown, Stage::Done],
            final_stage: Stage::Done,
            error,
            suite_outcome: None,
            cleanup: CleanupReport {
                executed: vec![RESTORE_NAMESPACE_ENV.to_string()],
                errors: cleanup_errors,
            },
            diagnostics: DiagnosticsStatus::Skipped,
            started_at: Timestamp::UNIX_EPOCH,
            duration: Duration::from_millis(1500),
        }
    }

    fn cleanup_error(action: &str) -> Error {
        Error::Cleanup {
            action: action.to_string(),
            source: ClusterError::command_failed("kubectl delete", "forbidden"),
        }
    }

    #[test]
    fn test_clean_run_is_ok() {
        let report = report(None, vec![]);
        assert!(report.is_success());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_setup_error_is_primary_over_cleanup() {
        let setup = Error::Install {
            namespace: "gw-test".to_string(),
            source: ClusterError::command_failed("helm", "boom"),
        };
        let err = report(Some(setup), vec![cleanup_error(DELETE_PREREQUISITE)])
            .into_result()
            .unwrap_err();

        assert!(matches!(err.primary(), Error::Install { .. }));
        assert_eq!(err.secondary().len(), 1);
        assert!(err.to_string().contains("and 1 cleanup error(s)"));
    }

    #[test]
    fn test_first_cleanup_error_is_primary_without_setup_error() {
        let err = report(
            None,
            vec![cleanup_error(UNINSTALL_COMPONENT), cleanup_error(DELETE_PREREQUISITE)],
        )
        .into_result()
        .unwrap_err();

        match err.primary() {
            Error::Cleanup { action, .. } => assert_eq!(action, UNINSTALL_COMPONENT),
            other => panic!("unexpected primary error: {other:?}"),
        }
        assert_eq!(err.secondary().len(), 1);
    }

    #[test]
    fn test_summary_serializes() {
        let report = report(
            Some(Error::SuiteFailure {
                reason: "2 checks failed".to_string(),
            }),
            vec![],
        );
        let json = serde_json::to_value(report.summary()).unwrap();

        assert_eq!(json["passed"], false);
        assert_eq!(json["namespace"], "gw-test");
        assert_eq!(json["finalStage"], "Done");
        assert_eq!(json["error"], "test suite failed: 2 checks failed");
        assert_eq!(json["diagnostics"]["status"], "skipped");
        assert_eq!(json["durationMs"], 1500);
        assert_eq!(json["stages"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_diagnostics_status_attempted() {
        assert!(!DiagnosticsStatus::Skipped.attempted());
        assert!(DiagnosticsStatus::Captured.attempted());
        assert!(
            DiagnosticsStatus::Failed {
                reason: "x".to_string()
            }
            .attempted()
        );
    }
}
