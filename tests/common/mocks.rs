//! Mock collaborators recording every call into a shared log.
//!
//! Each mock can be told to succeed, fail, or panic, so tests can stop a run
//! at any stage and then inspect exactly what setup and teardown did.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use install_harness::{
    ClusterClient, ClusterError, ComponentInstaller, DiagnosticsHook, InstallationContext,
    ManifestReference, Orchestrator, SuiteOutcome, SuiteRunner,
};

/// One collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Apply(PathBuf),
    Delete(PathBuf),
    WaitNamespace(String),
    Install(String),
    Uninstall(String),
    /// Suite run, with the namespace it got and what the environment said
    Suite {
        namespace: String,
        env_value: Option<String>,
    },
    Diagnostics(String),
}

impl Call {
    pub fn is_apply(&self) -> bool {
        matches!(self, Call::Apply(_))
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Call::Delete(_))
    }

    pub fn is_install(&self) -> bool {
        matches!(self, Call::Install(_))
    }

    pub fn is_uninstall(&self) -> bool {
        matches!(self, Call::Uninstall(_))
    }

    pub fn is_suite(&self) -> bool {
        matches!(self, Call::Suite { .. })
    }

    pub fn is_diagnostics(&self) -> bool {
        matches!(self, Call::Diagnostics(_))
    }
}

/// Shared, ordered call log.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    /// Snapshot of every call so far
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|&c| pred(c)).count()
    }

    /// Index of the first call matching `pred`
    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(pred)
    }
}

/// What a mocked operation does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Behavior {
    #[default]
    Succeed,
    Fail,
    Panic,
}

impl Behavior {
    fn result(self, operation: &str) -> Result<(), ClusterError> {
        match self {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(ClusterError::command_failed(
                operation,
                "injected failure",
            )),
            Behavior::Panic => panic!("injected panic in {operation}"),
        }
    }
}

/// What the mocked suite reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SuiteBehavior {
    #[default]
    Pass,
    Fail(String),
    Panic,
    /// Never finishes
    Hang,
}

pub struct MockCluster {
    log: CallLog,
    apply: Behavior,
    delete: Behavior,
    wait: Behavior,
}

impl ClusterClient for MockCluster {
    async fn apply_manifest(&self, manifest: &ManifestReference) -> Result<(), ClusterError> {
        self.log.record(Call::Apply(manifest.path().to_path_buf()));
        self.apply.result("kubectl apply")
    }

    async fn delete_manifest(&self, manifest: &ManifestReference) -> Result<(), ClusterError> {
        self.log.record(Call::Delete(manifest.path().to_path_buf()));
        self.delete.result("kubectl delete")
    }

    async fn wait_for_namespace(&self, name: &str, timeout: Duration) -> Result<(), ClusterError> {
        self.log.record(Call::WaitNamespace(name.to_string()));
        match self.wait {
            Behavior::Fail => Err(ClusterError::Timeout(timeout)),
            other => other.result("wait for namespace"),
        }
    }
}

pub struct MockInstaller {
    log: CallLog,
    install: Behavior,
    uninstall: Behavior,
}

impl ComponentInstaller for MockInstaller {
    async fn install(&self, ctx: &InstallationContext) -> Result<(), ClusterError> {
        self.log.record(Call::Install(ctx.namespace().to_string()));
        self.install.result("helm upgrade --install")
    }

    async fn uninstall(&self, ctx: &InstallationContext) -> Result<(), ClusterError> {
        self.log.record(Call::Uninstall(ctx.namespace().to_string()));
        self.uninstall.result("helm uninstall")
    }
}

pub struct MockSuite {
    log: CallLog,
    namespace_env: String,
    behavior: SuiteBehavior,
}

impl SuiteRunner for MockSuite {
    async fn run(&self, ctx: &InstallationContext) -> SuiteOutcome {
        self.log.record(Call::Suite {
            namespace: ctx.namespace().to_string(),
            env_value: std::env::var(&self.namespace_env).ok(),
        });
        match &self.behavior {
            SuiteBehavior::Pass => SuiteOutcome::Passed,
            SuiteBehavior::Fail(reason) => SuiteOutcome::failed(reason.clone()),
            SuiteBehavior::Panic => panic!("injected panic in suite"),
            SuiteBehavior::Hang => std::future::pending().await,
        }
    }
}

pub struct MockDiagnostics {
    log: CallLog,
    behavior: Behavior,
}

impl DiagnosticsHook for MockDiagnostics {
    async fn capture(&self, ctx: &InstallationContext) -> Result<(), ClusterError> {
        self.log.record(Call::Diagnostics(ctx.namespace().to_string()));
        self.behavior.result("capture diagnostics")
    }
}

pub type MockOrchestrator = Orchestrator<MockCluster, MockInstaller, MockSuite, MockDiagnostics>;

/// Behavior of every mocked collaborator for one run.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub apply: Behavior,
    pub delete: Behavior,
    pub wait: Behavior,
    pub install: Behavior,
    pub uninstall: Behavior,
    pub suite: SuiteBehavior,
    pub diagnostics: Behavior,
}

impl MockConfig {
    /// Build an orchestrator over mocks sharing `log`.
    ///
    /// `namespace_env` is the key the suite reads back from the environment.
    pub fn orchestrator(&self, log: &CallLog, namespace_env: &str) -> MockOrchestrator {
        Orchestrator::new(
            MockCluster {
                log: log.clone(),
                apply: self.apply,
                delete: self.delete,
                wait: self.wait,
            },
            MockInstaller {
                log: log.clone(),
                install: self.install,
                uninstall: self.uninstall,
            },
            MockSuite {
                log: log.clone(),
                namespace_env: namespace_env.to_string(),
                behavior: self.suite.clone(),
            },
            MockDiagnostics {
                log: log.clone(),
                behavior: self.diagnostics,
            },
        )
        .with_component_name("kgateway")
    }
}
