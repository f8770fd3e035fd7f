// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for install-harness.
//!
//! Uses proptest to generate random failure patterns and verify that teardown
//! stays ordered and exhaustive and that the environment is always restored.

#[path = "../common/mod.rs"]
mod common;

use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use install_harness::lifecycle::{LifecycleEvent, LifecycleStateMachine, Stage, TransitionContext};
use install_harness::{ClusterError, CleanupQueue, EnvGuard, Error};

use common::fixtures::{InstallPlanBuilder, unique_env_key};
use common::mocks::{Behavior, Call, CallLog, MockConfig, SuiteBehavior};

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

/// Strategy for a mocked operation that returns (never panics).
fn returning_behavior() -> impl Strategy<Value = Behavior> {
    prop_oneof![3 => Just(Behavior::Succeed), 1 => Just(Behavior::Fail)]
}

/// Strategy for a suite outcome.
fn suite_behavior() -> impl Strategy<Value = SuiteBehavior> {
    prop_oneof![
        Just(SuiteBehavior::Pass),
        "[a-z ]{1,20}".prop_map(SuiteBehavior::Fail),
    ]
}

fn mock_config() -> impl Strategy<Value = MockConfig> {
    (
        returning_behavior(),
        returning_behavior(),
        returning_behavior(),
        returning_behavior(),
        returning_behavior(),
        suite_behavior(),
        returning_behavior(),
    )
        .prop_map(
            |(apply, delete, wait, install, uninstall, suite, diagnostics)| MockConfig {
                apply,
                delete,
                wait,
                install,
                uninstall,
                suite,
                diagnostics,
            },
        )
}

/// Strategy for all lifecycle events.
fn any_event() -> impl Strategy<Value = LifecycleEvent> {
    prop_oneof![
        Just(LifecycleEvent::PrerequisiteApplied),
        Just(LifecycleEvent::InstallStarted),
        Just(LifecycleEvent::NamespaceReady),
        Just(LifecycleEvent::SuiteStarted),
        Just(LifecycleEvent::SuitePassed),
        Just(LifecycleEvent::SuiteFailed),
        Just(LifecycleEvent::TeardownStarted),
        Just(LifecycleEvent::TeardownFinished),
    ]
}

proptest! {
    /// Cleanup runs every action exactly once, newest first, whatever fails.
    #[test]
    fn cleanup_is_reverse_ordered_and_exhaustive(failures in prop::collection::vec(any::<bool>(), 0..20)) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = CleanupQueue::new();
        for (i, fail) in failures.iter().copied().enumerate() {
            let log = Arc::clone(&log);
            queue.register(format!("action-{i}"), move || async move {
                log.lock().unwrap().push(i);
                if fail {
                    Err(ClusterError::command_failed("cleanup", format!("action {i} failed")))
                } else {
                    Ok(())
                }
            });
        }

        let report = block_on(queue.run_all());

        let expected: Vec<usize> = (0..failures.len()).rev().collect();
        prop_assert_eq!(&*log.lock().unwrap(), &expected);
        prop_assert_eq!(report.executed.len(), failures.len());
        prop_assert_eq!(report.errors.len(), failures.iter().filter(|f| **f).count());

        let last_failing = failures.iter().rposition(|f| *f);
        match (report.first_error(), last_failing) {
            (None, None) => {}
            (Some(Error::Cleanup { action, .. }), Some(i)) => {
                prop_assert_eq!(action, &format!("action-{i}"));
            }
            (other, i) => prop_assert!(false, "unexpected first error {:?} for {:?}", other, i),
        }
    }

    /// Acquire then release leaves the variable exactly as it was.
    #[test]
    fn env_guard_restores_prior_state(prior in prop::option::of("[a-zA-Z0-9-]{0,16}"), default in "[a-z][a-z0-9-]{0,16}") {
        let key = unique_env_key();
        if let Some(value) = &prior {
            unsafe { std::env::set_var(&key, value) };
        }

        let mut guard = EnvGuard::acquire(&key, &default);
        prop_assert_eq!(guard.was_predefined(), prior.is_some());
        prop_assert_eq!(guard.value(), prior.as_deref().unwrap_or(&default));
        guard.release();
        guard.release();

        prop_assert_eq!(std::env::var(&key).ok(), prior);
        unsafe { std::env::remove_var(&key) };
    }

    /// Whatever fails, every successful apply/install is undone exactly once
    /// and the environment ends where it started.
    #[test]
    fn run_undoes_exactly_what_it_did(config in mock_config(), predefined in any::<bool>()) {
        let plan = InstallPlanBuilder::new().build();
        if predefined {
            unsafe { std::env::set_var(&plan.namespace_env, "ci-provided") };
        }
        let log = CallLog::new();

        let report = block_on(config.orchestrator(&log, &plan.namespace_env).run(&plan));

        let applied = config.apply == Behavior::Succeed;
        let installed = applied && config.install == Behavior::Succeed;
        prop_assert_eq!(log.count(Call::is_delete), usize::from(applied));
        prop_assert_eq!(log.count(Call::is_uninstall), usize::from(installed));

        let suite_failed = log.count(Call::is_suite) == 1 && config.suite != SuiteBehavior::Pass;
        prop_assert_eq!(log.count(Call::is_diagnostics), usize::from(suite_failed));
        if let (Some(d), Some(u)) = (log.position(Call::is_diagnostics), log.position(Call::is_uninstall)) {
            prop_assert!(d < u);
        }

        prop_assert_eq!(report.final_stage, Stage::Done);
        if predefined {
            let ns_value = std::env::var(&plan.namespace_env).ok();
            prop_assert_eq!(ns_value.as_deref(), Some("ci-provided"));
            unsafe { std::env::remove_var(&plan.namespace_env) };
        } else {
            prop_assert!(std::env::var_os(&plan.namespace_env).is_none());
        }
    }

    /// Done is terminal: no event ever leaves it.
    #[test]
    fn done_is_terminal(event in any_event()) {
        let sm = LifecycleStateMachine::new();
        let ctx = TransitionContext::new()
            .with_prerequisite_cleanup(true)
            .with_uninstall(true)
            .with_diagnostics(true);
        prop_assert!(!sm.transition(&Stage::Done, event, &ctx).is_success());
    }

    /// Random event sequences never skip the suite: Completed or Failed is
    /// only ever entered from SuiteRunning.
    #[test]
    fn outcome_stages_only_follow_suite(events in prop::collection::vec(any_event(), 1..30)) {
        let sm = LifecycleStateMachine::new();
        let ctx = TransitionContext::new()
            .with_prerequisite_cleanup(true)
            .with_uninstall(true)
            .with_diagnostics(true);

        let mut stage = Stage::Idle;
        for event in events {
            let before = stage;
            if let install_harness::lifecycle::TransitionResult::Success { to, .. } =
                sm.transition(&stage, event, &ctx)
            {
                stage = to;
            }
            if stage != before && matches!(stage, Stage::Completed | Stage::Failed) {
                prop_assert_eq!(before, Stage::SuiteRunning);
            }
        }
    }
}
