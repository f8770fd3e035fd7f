//! Diagnostic hints for a failed run.
//!
//! Provides actionable kubectl and helm commands for investigating a run,
//! keyed on the stage the run had reached when it failed.

use std::fmt;

use crate::lifecycle::Stage;

/// A diagnostic command that can be run to investigate an issue.
#[derive(Debug, Clone)]
pub struct DiagnosticCommand {
    /// Description of what this command checks.
    pub description: &'static str,
    /// The actual command to run.
    pub command: String,
}

impl DiagnosticCommand {
    fn new(description: &'static str, command: impl Into<String>) -> Self {
        Self {
            description,
            command: command.into(),
        }
    }
}

/// Diagnostic hint for a failed stage.
#[derive(Debug, Clone)]
pub struct DiagnosticHint {
    /// Summary of the likely issue.
    pub summary: &'static str,
    /// Common causes of this issue.
    pub common_causes: Vec<&'static str>,
    /// Commands to run to diagnose the problem.
    pub commands: Vec<DiagnosticCommand>,
}

impl DiagnosticHint {
    /// Generate a diagnostic hint for a run that failed in `stage`.
    ///
    /// # Arguments
    /// * `stage` - The last stage the run reached
    /// * `namespace` - The install namespace
    /// * `release` - The helm release of the component under test
    pub fn for_stage(stage: Stage, namespace: &str, release: &str) -> Self {
        match stage {
            Stage::Idle => Self::prerequisite_stage(),
            Stage::PrereqApplied | Stage::ComponentInstalling => {
                Self::install_stage(namespace, release)
            }
            Stage::ComponentReady | Stage::SuiteRunning | Stage::Failed => {
                Self::suite_stage(namespace, release)
            }
            Stage::Completed | Stage::TearingDown | Stage::Done => {
                Self::teardown_stage(namespace, release)
            }
        }
    }

    fn prerequisite_stage() -> Self {
        Self {
            summary: "Prerequisite manifest could not be applied",
            common_causes: vec![
                "API server unreachable or kube context points at the wrong cluster",
                "CRD already exists with an incompatible stored version",
                "Insufficient RBAC to create cluster-scoped resources",
            ],
            commands: vec![
                DiagnosticCommand::new("Check cluster connectivity", "kubectl cluster-info"),
                DiagnosticCommand::new("List installed CRDs", "kubectl get crds"),
                DiagnosticCommand::new(
                    "Check permission to create CRDs",
                    "kubectl auth can-i create customresourcedefinitions",
                ),
            ],
        }
    }

    fn install_stage(namespace: &str, release: &str) -> Self {
        Self {
            summary: "Component install failed or its namespace never became ready",
            common_causes: vec![
                "Image pull failed (ImagePullBackOff)",
                "Invalid values file for the chart",
                "Controller crashing on startup (CrashLoopBackOff)",
                "Namespace stuck terminating from a previous run",
            ],
            commands: vec![
                DiagnosticCommand::new(
                    "Check release status",
                    format!("helm status {release} -n {namespace}"),
                ),
                DiagnosticCommand::new(
                    "Check release history",
                    format!("helm history {release} -n {namespace}"),
                ),
                DiagnosticCommand::new(
                    "Check namespace phase",
                    format!("kubectl get namespace {namespace} -o wide"),
                ),
                DiagnosticCommand::new(
                    "Check pod status",
                    format!("kubectl get pods -n {namespace} -o wide"),
                ),
                DiagnosticCommand::new(
                    "Check events in namespace",
                    format!(
                        "kubectl get events -n {namespace} --sort-by='.lastTimestamp' | tail -20"
                    ),
                ),
            ],
        }
    }

    fn suite_stage(namespace: &str, release: &str) -> Self {
        Self {
            summary: "Test suite failed against the installation",
            common_causes: vec![
                "Component not fully ready when the suite started",
                "Regression in the component under test",
                "Suite depends on resources from a previous run",
            ],
            commands: vec![
                DiagnosticCommand::new(
                    "Check everything in the install namespace",
                    format!("kubectl get all -n {namespace} -o wide"),
                ),
                DiagnosticCommand::new(
                    "Check component logs",
                    format!(
                        "kubectl logs -n {namespace} -l app.kubernetes.io/instance={release} --all-containers --tail=200"
                    ),
                ),
                DiagnosticCommand::new(
                    "Check deployment conditions",
                    format!("kubectl describe deployments -n {namespace}"),
                ),
                DiagnosticCommand::new(
                    "Check events in namespace",
                    format!(
                        "kubectl get events -n {namespace} --sort-by='.lastTimestamp' | tail -20"
                    ),
                ),
            ],
        }
    }

    fn teardown_stage(namespace: &str, release: &str) -> Self {
        Self {
            summary: "Teardown left resources behind",
            common_causes: vec![
                "Finalizers blocking namespace deletion",
                "Release already removed out of band",
            ],
            commands: vec![
                DiagnosticCommand::new(
                    "Check remaining releases",
                    format!("helm list -n {namespace} --all"),
                ),
                DiagnosticCommand::new(
                    "Check namespace finalizers",
                    format!("kubectl get namespace {namespace} -o jsonpath='{{.spec.finalizers}}'"),
                ),
                DiagnosticCommand::new(
                    "Check leftover component resources",
                    format!("kubectl get all -A -l app.kubernetes.io/instance={release}"),
                ),
            ],
        }
    }
}

impl fmt::Display for DiagnosticHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Issue: {}", self.summary)?;
        writeln!(f)?;
        writeln!(f, "Common causes:")?;
        for cause in &self.common_causes {
            writeln!(f, "  - {cause}")?;
        }
        writeln!(f)?;
        writeln!(f, "Diagnostic commands:")?;
        for (i, cmd) in self.commands.iter().enumerate() {
            writeln!(f, "  {}. {}", i + 1, cmd.description)?;
            writeln!(f, "     $ {}", cmd.command)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_contains_namespace_and_release() {
        let hint = DiagnosticHint::for_stage(Stage::ComponentInstalling, "my-namespace", "gateway");

        for cmd in &hint.commands {
            assert!(
                cmd.command.contains("my-namespace") || cmd.command.contains("gateway"),
                "Command should mention namespace or release: {}",
                cmd.command
            );
        }
    }

    #[test]
    fn test_all_stages_have_hints() {
        let stages = vec![
            Stage::Idle,
            Stage::PrereqApplied,
            Stage::ComponentInstalling,
            Stage::ComponentReady,
            Stage::SuiteRunning,
            Stage::Completed,
            Stage::Failed,
            Stage::TearingDown,
            Stage::Done,
        ];

        for stage in stages {
            let hint = DiagnosticHint::for_stage(stage, "test-ns", "test-release");
            assert!(!hint.summary.is_empty(), "Stage {:?} has empty summary", stage);
            assert!(!hint.commands.is_empty(), "Stage {:?} has no commands", stage);
        }
    }

    #[test]
    fn test_display_format() {
        let hint = DiagnosticHint::for_stage(Stage::Failed, "default", "gateway");

        let output = hint.to_string();
        assert!(output.contains("Issue:"));
        assert!(output.contains("Common causes:"));
        assert!(output.contains("Diagnostic commands:"));
        assert!(output.contains("kubectl"));
    }

    #[test]
    fn test_finalizer_command_escapes_braces() {
        let hint = DiagnosticHint::for_stage(Stage::Done, "gw-test", "gateway");
        assert!(
            hint.commands
                .iter()
                .any(|c| c.command.contains("{.spec.finalizers}"))
        );
    }
}
