//! The namespace environment variable before, during, and after a run.

use install_harness::lifecycle::RESTORE_NAMESPACE_ENV;

use crate::common::fixtures::InstallPlanBuilder;
use crate::common::mocks::{Behavior, Call, CallLog, MockConfig, SuiteBehavior};

#[tokio::test]
async fn test_undefined_env_is_set_during_run_and_removed_after() {
    let plan = InstallPlanBuilder::new().default_namespace("gw-default").build();
    assert!(std::env::var_os(&plan.namespace_env).is_none());
    let log = CallLog::new();

    let report = MockConfig::default()
        .orchestrator(&log, &plan.namespace_env)
        .run(&plan)
        .await;

    assert!(log.calls().contains(&Call::Suite {
        namespace: "gw-default".to_string(),
        env_value: Some("gw-default".to_string()),
    }));
    assert_eq!(report.namespace, "gw-default");
    assert!(std::env::var_os(&plan.namespace_env).is_none());
}

#[tokio::test]
async fn test_predefined_env_is_used_and_kept() {
    let plan = InstallPlanBuilder::new().default_namespace("gw-default").build();
    unsafe { std::env::set_var(&plan.namespace_env, "ci-provided") };
    let log = CallLog::new();

    let report = MockConfig::default()
        .orchestrator(&log, &plan.namespace_env)
        .run(&plan)
        .await;

    assert_eq!(report.namespace, "ci-provided");
    assert!(log.calls().contains(&Call::Install("ci-provided".to_string())));
    assert_eq!(std::env::var(&plan.namespace_env).unwrap(), "ci-provided");

    unsafe { std::env::remove_var(&plan.namespace_env) };
}

#[tokio::test]
async fn test_predefined_env_is_kept_on_failure() {
    let plan = InstallPlanBuilder::new().build();
    unsafe { std::env::set_var(&plan.namespace_env, "ci-provided") };
    let log = CallLog::new();
    let config = MockConfig {
        install: Behavior::Fail,
        ..Default::default()
    };

    config.orchestrator(&log, &plan.namespace_env).run(&plan).await;

    assert_eq!(std::env::var(&plan.namespace_env).unwrap(), "ci-provided");
    unsafe { std::env::remove_var(&plan.namespace_env) };
}

#[tokio::test]
async fn test_undefined_env_is_removed_on_every_failure() {
    let configs = [
        MockConfig {
            apply: Behavior::Fail,
            ..Default::default()
        },
        MockConfig {
            wait: Behavior::Fail,
            ..Default::default()
        },
        MockConfig {
            suite: SuiteBehavior::Fail("x".to_string()),
            uninstall: Behavior::Fail,
            delete: Behavior::Fail,
            ..Default::default()
        },
    ];

    for config in configs {
        let plan = InstallPlanBuilder::new().build();
        let log = CallLog::new();
        let report = config.orchestrator(&log, &plan.namespace_env).run(&plan).await;

        assert!(
            std::env::var_os(&plan.namespace_env).is_none(),
            "env left behind for {config:?}"
        );
        assert_eq!(
            report.cleanup.executed.last().map(String::as_str),
            Some(RESTORE_NAMESPACE_ENV)
        );
    }
}
