//! Formal finite state machine for a harness run.
//!
//! Every stage change the orchestrator makes goes through this table, so an
//! out-of-order step (running the suite before the uninstall is queued,
//! tearing down a failed run before diagnostics) shows up as a rejected
//! transition instead of silently happening.

use std::fmt;

use serde::Serialize;

/// Stage of a harness run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum Stage {
    /// Nothing has touched the cluster yet
    #[default]
    Idle,
    /// Prerequisite manifest is applied
    PrereqApplied,
    /// Component install is in progress
    ComponentInstalling,
    /// Component is installed and its namespace is observable
    ComponentReady,
    /// The suite has control
    SuiteRunning,
    /// The suite passed
    Completed,
    /// The suite failed
    Failed,
    /// Teardown actions are running
    TearingDown,
    /// Teardown finished
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => write!(f, "Idle"),
            Stage::PrereqApplied => write!(f, "PrereqApplied"),
            Stage::ComponentInstalling => write!(f, "ComponentInstalling"),
            Stage::ComponentReady => write!(f, "ComponentReady"),
            Stage::SuiteRunning => write!(f, "SuiteRunning"),
            Stage::Completed => write!(f, "Completed"),
            Stage::Failed => write!(f, "Failed"),
            Stage::TearingDown => write!(f, "TearingDown"),
            Stage::Done => write!(f, "Done"),
        }
    }
}

/// Events that trigger stage transitions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Prerequisite manifest applied successfully
    PrerequisiteApplied,
    /// Component install started
    InstallStarted,
    /// Install succeeded and the namespace is observable
    NamespaceReady,
    /// Control handed to the suite
    SuiteStarted,
    /// Suite reported success
    SuitePassed,
    /// Suite reported failure (or panicked)
    SuiteFailed,
    /// Teardown begins
    TeardownStarted,
    /// Every teardown action has run
    TeardownFinished,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::PrerequisiteApplied => write!(f, "PrerequisiteApplied"),
            LifecycleEvent::InstallStarted => write!(f, "InstallStarted"),
            LifecycleEvent::NamespaceReady => write!(f, "NamespaceReady"),
            LifecycleEvent::SuiteStarted => write!(f, "SuiteStarted"),
            LifecycleEvent::SuitePassed => write!(f, "SuitePassed"),
            LifecycleEvent::SuiteFailed => write!(f, "SuiteFailed"),
            LifecycleEvent::TeardownStarted => write!(f, "TeardownStarted"),
            LifecycleEvent::TeardownFinished => write!(f, "TeardownFinished"),
        }
    }
}

/// Facts about the run that guards inspect
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    /// Whether the prerequisite-delete action is queued
    pub prerequisite_cleanup_registered: bool,
    /// Whether the uninstall action is queued
    pub uninstall_registered: bool,
    /// Whether the diagnostics hook has been invoked
    pub diagnostics_attempted: bool,
}

impl TransitionContext {
    /// Create an empty transition context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set prerequisite_cleanup_registered flag
    pub fn with_prerequisite_cleanup(mut self, registered: bool) -> Self {
        self.prerequisite_cleanup_registered = registered;
        self
    }

    /// Set uninstall_registered flag
    pub fn with_uninstall(mut self, registered: bool) -> Self {
        self.uninstall_registered = registered;
        self
    }

    /// Set diagnostics_attempted flag
    pub fn with_diagnostics(mut self, attempted: bool) -> Self {
        self.diagnostics_attempted = attempted;
        self
    }
}

/// A state transition definition
#[derive(Debug)]
pub struct Transition {
    /// Source stage
    pub from: Stage,
    /// Target stage
    pub to: Stage,
    /// Event that triggers this transition
    pub event: LifecycleEvent,
    /// Human-readable description of this transition
    pub description: &'static str,
}

impl Transition {
    const fn new(
        from: Stage,
        to: Stage,
        event: LifecycleEvent,
        description: &'static str,
    ) -> Self {
        Self {
            from,
            to,
            event,
            description,
        }
    }
}

/// Result of attempting a state transition
#[derive(Debug)]
pub enum TransitionResult {
    /// Transition was successful
    Success {
        from: Stage,
        to: Stage,
        event: LifecycleEvent,
        description: &'static str,
    },
    /// Transition was not valid for current stage
    InvalidTransition {
        current: Stage,
        event: LifecycleEvent,
    },
    /// Guard condition prevented the transition
    GuardFailed {
        from: Stage,
        to: Stage,
        event: LifecycleEvent,
        reason: String,
    },
}

impl TransitionResult {
    /// Whether the transition happened
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionResult::Success { .. })
    }
}

/// Transition table for a harness run
pub struct LifecycleStateMachine {
    transitions: Vec<Transition>,
}

impl Default for LifecycleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleStateMachine {
    /// Create a new state machine with the defined transition table
    pub fn new() -> Self {
        Self {
            transitions: vec![
                // === Setup ===
                Transition::new(
                    Stage::Idle,
                    Stage::PrereqApplied,
                    LifecycleEvent::PrerequisiteApplied,
                    "Prerequisite manifest applied",
                ),
                Transition::new(
                    Stage::PrereqApplied,
                    Stage::ComponentInstalling,
                    LifecycleEvent::InstallStarted,
                    "Installing component",
                ),
                Transition::new(
                    Stage::ComponentInstalling,
                    Stage::ComponentReady,
                    LifecycleEvent::NamespaceReady,
                    "Component installed and namespace observable",
                ),
                Transition::new(
                    Stage::ComponentReady,
                    Stage::SuiteRunning,
                    LifecycleEvent::SuiteStarted,
                    "Suite started",
                ),
                // === Suite outcome ===
                Transition::new(
                    Stage::SuiteRunning,
                    Stage::Completed,
                    LifecycleEvent::SuitePassed,
                    "Suite passed",
                ),
                Transition::new(
                    Stage::SuiteRunning,
                    Stage::Failed,
                    LifecycleEvent::SuiteFailed,
                    "Suite failed",
                ),
                // === Teardown, reachable from every stage before it ===
                Transition::new(
                    Stage::Idle,
                    Stage::TearingDown,
                    LifecycleEvent::TeardownStarted,
                    "Teardown before anything was applied",
                ),
                Transition::new(
                    Stage::PrereqApplied,
                    Stage::TearingDown,
                    LifecycleEvent::TeardownStarted,
                    "Teardown after prerequisite apply",
                ),
                Transition::new(
                    Stage::ComponentInstalling,
                    Stage::TearingDown,
                    LifecycleEvent::TeardownStarted,
                    "Teardown after install or readiness failure",
                ),
                Transition::new(
                    Stage::ComponentReady,
                    Stage::TearingDown,
                    LifecycleEvent::TeardownStarted,
                    "Teardown before the suite started",
                ),
                Transition::new(
                    Stage::SuiteRunning,
                    Stage::TearingDown,
                    LifecycleEvent::TeardownStarted,
                    "Teardown with the suite interrupted",
                ),
                Transition::new(
                    Stage::Completed,
                    Stage::TearingDown,
                    LifecycleEvent::TeardownStarted,
                    "Teardown after a passing suite",
                ),
                Transition::new(
                    Stage::Failed,
                    Stage::TearingDown,
                    LifecycleEvent::TeardownStarted,
                    "Teardown after diagnostics of a failing suite",
                ),
                // === Terminal ===
                Transition::new(
                    Stage::TearingDown,
                    Stage::Done,
                    LifecycleEvent::TeardownFinished,
                    "Teardown finished",
                ),
            ],
        }
    }

    /// Attempt to transition to a new stage based on an event
    pub fn transition(
        &self,
        current: &Stage,
        event: LifecycleEvent,
        ctx: &TransitionContext,
    ) -> TransitionResult {
        let transition = self
            .transitions
            .iter()
            .find(|t| t.from == *current && t.event == event);

        match transition {
            Some(t) => {
                if let Some(reason) = self.check_guard(t, ctx) {
                    TransitionResult::GuardFailed {
                        from: t.from,
                        to: t.to,
                        event,
                        reason,
                    }
                } else {
                    TransitionResult::Success {
                        from: t.from,
                        to: t.to,
                        event,
                        description: t.description,
                    }
                }
            }
            None => TransitionResult::InvalidTransition {
                current: *current,
                event,
            },
        }
    }

    /// Check if a transition is valid (ignoring guards)
    pub fn can_transition(&self, from: &Stage, event: &LifecycleEvent) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == *from && t.event == *event)
    }

    /// Get all valid events for a given stage
    pub fn valid_events(&self, stage: &Stage) -> Vec<&LifecycleEvent> {
        self.transitions
            .iter()
            .filter(|t| t.from == *stage)
            .map(|t| &t.event)
            .collect()
    }

    /// Check guard conditions for a transition
    fn check_guard(&self, transition: &Transition, ctx: &TransitionContext) -> Option<String> {
        match (&transition.from, &transition.to, &transition.event) {
            // Guard: no install may start until the prerequisite delete is queued
            (Stage::PrereqApplied, Stage::ComponentInstalling, LifecycleEvent::InstallStarted) => {
                if !ctx.prerequisite_cleanup_registered {
                    Some("prerequisite cleanup is not registered".to_string())
                } else {
                    None
                }
            }
            // Guard: an installed component must have its uninstall queued
            (_, Stage::ComponentReady, LifecycleEvent::NamespaceReady) => {
                if !ctx.uninstall_registered {
                    Some("uninstall cleanup is not registered".to_string())
                } else {
                    None
                }
            }
            // Guard: a failed run captures diagnostics before anything is torn down
            (Stage::Failed, Stage::TearingDown, LifecycleEvent::TeardownStarted) => {
                if !ctx.diagnostics_attempted {
                    Some("diagnostics have not been captured".to_string())
                } else {
                    None
                }
            }
            _ => None,
        }
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

    #[test]
    fn test_idle_to_prereq_applied() {
        let sm = LifecycleStateMachine::new();
        let ctx = TransitionContext::new();

        let result = sm.transition(&Stage::Idle, LifecycleEvent::PrerequisiteApplied, &ctx);

        match result {
            TransitionResult::Success { from, to, .. } => {
                assert_eq!(from, Stage::Idle);
                assert_eq!(to, Stage::PrereqApplied);
            }
            _ => panic!("Expected successful transition"),
        }
    }

    #[test]
    fn test_install_requires_prerequisite_cleanup() {
        let sm = LifecycleStateMachine::new();

        let ctx = TransitionContext::new();
        let result = sm.transition(&Stage::PrereqApplied, LifecycleEvent::InstallStarted, &ctx);
        assert!(matches!(result, TransitionResult::GuardFailed { .. }));

        let ctx = TransitionContext::new().with_prerequisite_cleanup(true);
        let result = sm.transition(&Stage::PrereqApplied, LifecycleEvent::InstallStarted, &ctx);
        assert!(result.is_success());
    }

    #[test]
    fn test_ready_requires_uninstall() {
        let sm = LifecycleStateMachine::new();
        let base = TransitionContext::new().with_prerequisite_cleanup(true);

        let result = sm.transition(
            &Stage::ComponentInstalling,
            LifecycleEvent::NamespaceReady,
            &base,
        );
        assert!(matches!(result, TransitionResult::GuardFailed { .. }));

        let ctx = base.with_uninstall(true);
        let result = sm.transition(
            &Stage::ComponentInstalling,
            LifecycleEvent::NamespaceReady,
            &ctx,
        );
        assert!(result.is_success());
    }

    #[test]
    fn test_failed_teardown_requires_diagnostics() {
        let sm = LifecycleStateMachine::new();

        let result = sm.transition(
            &Stage::Failed,
            LifecycleEvent::TeardownStarted,
            &TransitionContext::new(),
        );
        assert!(matches!(result, TransitionResult::GuardFailed { .. }));

        let result = sm.transition(
            &Stage::Failed,
            LifecycleEvent::TeardownStarted,
            &TransitionContext::new().with_diagnostics(true),
        );
        assert!(result.is_success());
    }

    #[test]
    fn test_completed_teardown_needs_no_diagnostics() {
        let sm = LifecycleStateMachine::new();
        let result = sm.transition(
            &Stage::Completed,
            LifecycleEvent::TeardownStarted,
            &TransitionContext::new(),
        );
        assert!(result.is_success());
    }

    #[test]
    fn test_invalid_transition() {
        let sm = LifecycleStateMachine::new();
        let ctx = TransitionContext::new();

        // The suite cannot start before the component is ready
        let result = sm.transition(&Stage::PrereqApplied, LifecycleEvent::SuiteStarted, &ctx);
        assert!(matches!(result, TransitionResult::InvalidTransition { .. }));
    }

    #[test]
    fn test_done_is_terminal() {
        let sm = LifecycleStateMachine::new();
        assert!(sm.valid_events(&Stage::Done).is_empty());
    }

    #[test]
    fn test_teardown_reachable_from_every_stage_before_it() {
        let sm = LifecycleStateMachine::new();

        let stages = vec![
            Stage::Idle,
            Stage::PrereqApplied,
            Stage::ComponentInstalling,
            Stage::ComponentReady,
            Stage::SuiteRunning,
            Stage::Completed,
            Stage::Failed,
        ];

        for stage in stages {
            assert!(
                sm.can_transition(&stage, &LifecycleEvent::TeardownStarted),
                "Should be able to tear down from {:?}",
                stage
            );
        }
        assert!(!sm.can_transition(&Stage::TearingDown, &LifecycleEvent::TeardownStarted));
        assert!(!sm.can_transition(&Stage::Done, &LifecycleEvent::TeardownStarted));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::ComponentInstalling.to_string(), "ComponentInstalling");
        assert_eq!(Stage::default(), Stage::Idle);
        assert_eq!(LifecycleEvent::SuiteFailed.to_string(), "SuiteFailed");
    }
}
