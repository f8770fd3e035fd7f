//! Run lifecycle: the stage table and the orchestrator that walks it.

pub mod orchestrator;
pub mod state_machine;

pub use orchestrator::{
    DELETE_PREREQUISITE, DiagnosticsStatus, Orchestrator, RESTORE_NAMESPACE_ENV, RunError,
    RunReport, RunSummary, UNINSTALL_COMPONENT,
};
pub use state_machine::{
    LifecycleEvent, LifecycleStateMachine, Stage, TransitionContext, TransitionResult,
};
