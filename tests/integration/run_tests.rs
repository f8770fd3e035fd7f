//! Full runs against a live cluster.
//!
//! The component under test is just a namespace created through the API, so
//! these tests need no chart and no helm binary.

use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::ClusterRole;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::Client;

use install_harness::cluster::{namespace_is_active, wait_for_deletion};
use install_harness::lifecycle::DiagnosticsStatus;
use install_harness::{
    ClusterClient, ClusterError, ClusterHandle, ComponentInstaller, Error, InstallationContext,
    KubectlClient, NoDiagnostics, Orchestrator, SuiteOutcome, SuiteRunner,
};

use crate::cluster::{
    SharedTestCluster, cluster_role_manifest, init_tracing, temp_manifest, unique_suffix,
};
use crate::common::fixtures::InstallPlanBuilder;

/// Installs by creating the namespace, uninstalls by deleting it.
struct NamespaceInstaller {
    client: Client,
}

impl ComponentInstaller for NamespaceInstaller {
    async fn install(&self, ctx: &InstallationContext) -> Result<(), ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(ctx.namespace().to_string()),
                labels: Some(
                    [(
                        "app.kubernetes.io/managed-by".to_string(),
                        "integration-test".to_string(),
                    )]
                    .into_iter()
                    .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };
        api.create(&PostParams::default(), &ns).await?;
        Ok(())
    }

    async fn uninstall(&self, ctx: &InstallationContext) -> Result<(), ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(ctx.namespace(), &DeleteParams::background())
            .await?;
        wait_for_deletion(&api, ctx.namespace(), Duration::from_secs(120)).await
    }
}

/// Passes if the install namespace is active; optionally fails on purpose.
struct NamespaceSuite {
    client: Client,
    fail: bool,
}

impl SuiteRunner for NamespaceSuite {
    async fn run(&self, ctx: &InstallationContext) -> SuiteOutcome {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.get_opt(ctx.namespace()).await {
            Ok(Some(ns)) if namespace_is_active(&ns) && !self.fail => SuiteOutcome::Passed,
            Ok(Some(_)) if self.fail => SuiteOutcome::failed("failing on purpose"),
            Ok(_) => SuiteOutcome::failed("namespace is not active"),
            Err(e) => SuiteOutcome::failed(e.to_string()),
        }
    }
}

async fn run(client: Client, fail: bool) -> (install_harness::RunReport, String, String) {
    let role = format!("harness-it-{}", unique_suffix());
    let namespace = format!("harness-it-{}", unique_suffix());
    let path = temp_manifest("prereq", &cluster_role_manifest(&role));

    let plan = InstallPlanBuilder::new()
        .default_namespace(&namespace)
        .prerequisite_manifest(&path)
        .cluster(ClusterHandle::current("integration"))
        .readiness_timeout(Duration::from_secs(30))
        .build();

    let orchestrator = Orchestrator::new(
        KubectlClient::new(client.clone()),
        NamespaceInstaller {
            client: client.clone(),
        },
        NamespaceSuite { client, fail },
        NoDiagnostics,
    );
    let report = orchestrator.run(&plan).await;
    assert!(std::env::var_os(&plan.namespace_env).is_none());

    let _ = std::fs::remove_file(path);
    (report, role, namespace)
}

#[tokio::test]
#[ignore = "requires Kubernetes cluster"]
async fn test_full_run_against_cluster() {
    init_tracing();
    let cluster = SharedTestCluster::get().await;
    let client = cluster.new_client().await;

    let (report, role, namespace) = run(client.clone(), false).await;

    assert_eq!(report.suite_outcome, Some(SuiteOutcome::Passed));
    assert_eq!(report.cleanup.executed.len(), 3);
    assert!(report.cleanup.is_clean(), "{:?}", report.cleanup.errors);

    let roles: Api<ClusterRole> = Api::all(client.clone());
    assert!(roles.get_opt(&role).await.unwrap().is_none());
    let namespaces: Api<Namespace> = Api::all(client);
    assert!(namespaces.get_opt(&namespace).await.unwrap().is_none());
    report.into_result().expect("run should pass");
}

#[tokio::test]
#[ignore = "requires Kubernetes cluster"]
async fn test_failing_suite_still_tears_down() {
    init_tracing();
    let cluster = SharedTestCluster::get().await;
    let client = cluster.new_client().await;

    let (report, role, namespace) = run(client.clone(), true).await;

    assert_eq!(report.diagnostics, DiagnosticsStatus::Captured);
    let roles: Api<ClusterRole> = Api::all(client.clone());
    assert!(roles.get_opt(&role).await.unwrap().is_none());
    let namespaces: Api<Namespace> = Api::all(client);
    assert!(namespaces.get_opt(&namespace).await.unwrap().is_none());

    let err = report.into_result().unwrap_err();
    assert!(matches!(err.primary(), Error::SuiteFailure { .. }));
}

#[tokio::test]
#[ignore = "requires Kubernetes cluster"]
async fn test_namespace_wait_uses_kubectl_client() {
    init_tracing();
    let cluster = SharedTestCluster::get().await;
    let client = cluster.new_client().await;
    let kubectl = KubectlClient::new(client.clone());

    let namespace = format!("harness-wait-{}", unique_suffix());
    let installer = NamespaceInstaller { client };
    let ctx = InstallPlanBuilder::new()
        .cluster(ClusterHandle::current("integration"))
        .build()
        .build_context(&namespace);

    let waiter = kubectl.wait_for_namespace(&namespace, Duration::from_secs(30));
    let create = async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        installer.install(&ctx).await
    };
    let (waited, created) = tokio::join!(waiter, create);
    created.expect("namespace create failed");
    waited.expect("wait should observe the namespace");

    installer.uninstall(&ctx).await.expect("namespace delete failed");
}
