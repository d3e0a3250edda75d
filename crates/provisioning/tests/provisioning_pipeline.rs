//! End-to-end runs of the provisioning pipeline against in-memory collaborators

use crds::{Runtime, kyma_api_resource};
use kube::discovery::ApiResource;
use provisioner_client::{MockProvisionerClient, OperationState as ProvisionerState, OperationStatus, OperationType};
use provisioning_engine::config::{Config, KimConfig};
use provisioning_engine::error::{Component, Reason};
use provisioning_engine::hyperscaler::FakeAccountProvider;
use provisioning_engine::k8s::{
    KubeconfigSecretClientProvider, MockControlPlaneClient, MockKubeconfigConnector, MockRuntimeClientProvider,
    RuntimeClientProvider,
};
use provisioning_engine::model::{OperationState, SmOperatorCredentials};
use provisioning_engine::pipeline::{Dependencies, new_provisioning_manager, new_provisioning_queue};
use provisioning_engine::process::{EngineError, StagedManager};
use provisioning_engine::storage::{Instances, MemoryStorage, Operations};
use provisioning_engine::test_utils::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const KUBECONFIG: &str = "apiVersion: v1\nkind: Config\nclusters: []\n";

struct Harness {
    storage: MemoryStorage,
    provisioner: MockProvisionerClient,
    control_plane: MockControlPlaneClient,
    /// Clusters reachable through the kubeconfig secrets on the control plane
    connector: MockKubeconfigConnector,
    manager: StagedManager,
}

impl Harness {
    fn new(config: Config) -> Self {
        Self::with_runtime_clients(config, |_| Arc::new(MockRuntimeClientProvider::new()))
    }

    /// Runtime clients come from the secrets the pipeline writes itself
    fn with_kubeconfig_secrets(config: Config) -> Self {
        Self::with_runtime_clients(config, |harness| {
            Arc::new(
                KubeconfigSecretClientProvider::new(Arc::new(harness.control_plane.clone()))
                    .with_namespace("kyma-system")
                    .with_connector(Arc::new(harness.connector.clone())),
            )
        })
    }

    fn with_runtime_clients(
        config: Config,
        runtime_clients: impl FnOnce(&Partial) -> Arc<dyn RuntimeClientProvider>,
    ) -> Self {
        let partial = Partial {
            storage: MemoryStorage::new(),
            provisioner: MockProvisionerClient::new(),
            control_plane: MockControlPlaneClient::new(),
            connector: MockKubeconfigConnector::new(),
        };
        let deps = Dependencies {
            operations: Arc::new(partial.storage.clone()),
            instances: Arc::new(partial.storage.clone()),
            provisioner: Arc::new(partial.provisioner.clone()),
            control_plane: Arc::new(partial.control_plane.clone()),
            runtime_clients: runtime_clients(&partial),
            accounts: Arc::new(FakeAccountProvider::new()),
        };
        let manager = new_provisioning_manager(&deps, &config).unwrap();
        Self {
            storage: partial.storage,
            provisioner: partial.provisioner,
            control_plane: partial.control_plane,
            connector: partial.connector,
            manager,
        }
    }

    async fn seed(&self, plan_name: &str) {
        store_instance(&self.storage, create_test_instance(plan_name)).await;
        let mut op = create_test_operation(plan_name);
        op.state = OperationState::Pending;
        store_operation(&self.storage, op).await;
    }

    async fn execute(&self) -> Result<Duration, EngineError> {
        self.manager.execute(OPERATION_ID).await
    }

    async fn stored(&self) -> provisioning_engine::model::Operation {
        self.storage.get_operation_by_id(OPERATION_ID).await.unwrap()
    }
}

/// Collaborators shared between the harness and the runtime client provider
struct Partial {
    storage: MemoryStorage,
    provisioner: MockProvisionerClient,
    control_plane: MockControlPlaneClient,
    connector: MockKubeconfigConnector,
}

/// Every backoff hands the operation back instead of sleeping in place
fn config(kim: KimConfig) -> Config {
    Config {
        kim,
        max_step_processing_time: Duration::ZERO,
        ..Config::default()
    }
}

fn succeeded(runtime_id: Option<String>) -> OperationStatus {
    OperationStatus {
        id: Some(PROVISIONER_OPERATION_ID.to_string()),
        operation: OperationType::ProvisionNoInstall,
        state: ProvisionerState::Succeeded,
        message: None,
        runtime_id,
        last_error: None,
    }
}

#[tokio::test]
async fn test_preview_plan_with_kim_dry_run_resumes_until_succeeded() {
    init_test_tracing();
    let harness = Harness::new(config(KimConfig {
        enabled: true,
        plans: vec!["preview".to_string()],
        view_only: false,
        dry_run: true,
        kim_only_plans: Vec::new(),
    }));
    harness.seed("preview").await;

    // provisioner still working
    let backoff = harness.execute().await.unwrap();
    assert_eq!(backoff, Duration::from_secs(20));

    let op = harness.stored().await;
    assert_eq!(op.state, OperationState::InProgress);
    assert_eq!(op.finished_stages, vec!["start"]);
    assert_eq!(op.instance_details.kyma_resource_namespace, "kyma-system");
    assert_eq!(op.runtime_id().len(), 36);
    assert_eq!(op.instance_details.runtime_resource_name, op.runtime_id());
    assert!(!op.provisioner_operation_id.is_empty());
    assert_eq!(harness.provisioner.provision_requests().len(), 1);

    harness
        .provisioner
        .finish_operation(&op.provisioner_operation_id, ProvisionerState::Succeeded);
    harness.provisioner.set_kubeconfig(op.runtime_id(), Some(KUBECONFIG));

    let backoff = harness.execute().await.unwrap();
    assert_eq!(backoff, Duration::ZERO);

    let op = harness.stored().await;
    assert_eq!(op.state, OperationState::Succeeded);
    assert_eq!(op.description, "Processing finished");
    assert_eq!(op.finished_stages, vec!["start", "create_runtime", "create_kyma_resource"]);
    // nothing new asked from the provisioner on resume
    assert_eq!(harness.provisioner.provision_requests().len(), 1);
    // dry run: no Runtime resource, only the kubeconfig secret and the Kyma resource
    assert!(harness.control_plane.objects(&ApiResource::erase::<Runtime>(&())).is_empty());
    assert_eq!(
        harness.control_plane.writes(),
        vec![
            format!("CREATE Secret/kyma-system/kubeconfig-{}", op.runtime_id()),
            format!("CREATE Kyma/kyma-system/{}", op.runtime_id()),
        ]
    );
    let instance = harness.storage.get_by_id(INSTANCE_ID).await.unwrap();
    assert_eq!(instance.runtime_id, op.runtime_id());
}

#[tokio::test]
async fn test_kim_only_plan_never_contacts_provisioner() {
    init_test_tracing();
    let harness = Harness::new(config(KimConfig {
        enabled: true,
        plans: vec!["gcp".to_string()],
        view_only: false,
        dry_run: false,
        kim_only_plans: vec!["gcp".to_string()],
    }));
    harness.seed("gcp").await;

    // Runtime resource created, waiting for it to become ready
    let backoff = harness.execute().await.unwrap();
    assert_eq!(backoff, Duration::from_millis(500));

    let op = harness.stored().await;
    let resource = ApiResource::erase::<Runtime>(&());
    let mut runtime = harness
        .control_plane
        .object(&resource, "kyma-system", op.runtime_id())
        .unwrap();
    assert_eq!(
        runtime.metadata.labels.as_ref().unwrap()["kyma-project.io/controlled-by-provisioner"],
        "false"
    );
    runtime.data["status"] = json!({ "state": "Ready" });
    harness.control_plane.insert_object(&resource, runtime);

    assert_eq!(harness.execute().await.unwrap(), Duration::ZERO);
    assert_eq!(harness.stored().await.state, OperationState::Succeeded);
    assert_eq!(harness.provisioner.calls(), 0);
    assert!(harness.provisioner.provision_requests().is_empty());
    assert!(
        harness
            .control_plane
            .object(&kyma_api_resource(), "kyma-system", op.runtime_id())
            .is_some()
    );
}

#[tokio::test]
async fn test_own_cluster_plan_uses_given_kubeconfig() {
    let harness = Harness::new(config(KimConfig::default()));
    store_instance(&harness.storage, create_test_instance("own_cluster")).await;
    let mut op = create_test_operation("own_cluster");
    op.state = OperationState::Pending;
    op.provisioning_parameters.parameters.kubeconfig = Some(KUBECONFIG.to_string());
    store_operation(&harness.storage, op).await;

    assert_eq!(harness.execute().await.unwrap(), Duration::ZERO);

    let op = harness.stored().await;
    assert_eq!(op.state, OperationState::Succeeded);
    assert_eq!(harness.provisioner.calls(), 0);
    assert_eq!(
        harness.control_plane.writes(),
        vec![
            format!("CREATE Secret/kyma-system/kubeconfig-{}", op.runtime_id()),
            format!("CREATE Kyma/kyma-system/{}", op.runtime_id()),
        ]
    );
    let secret = harness
        .control_plane
        .secret("kyma-system", &format!("kubeconfig-{}", op.runtime_id()))
        .unwrap();
    assert_eq!(secret.data.unwrap()["config"].0, KUBECONFIG.as_bytes());
}

#[tokio::test]
async fn test_failed_provisioner_operation_fails_the_operation() {
    let harness = Harness::new(config(KimConfig::default()));
    harness.seed("azure").await;

    assert_eq!(harness.execute().await.unwrap(), Duration::from_secs(20));
    let op = harness.stored().await;
    harness
        .provisioner
        .finish_operation(&op.provisioner_operation_id, ProvisionerState::Failed);

    let err = harness.execute().await.unwrap_err();
    let EngineError::Failed(failure) = err else {
        panic!("expected a failed operation, got {err}");
    };
    assert_eq!(failure.message, "provisioner client returns failed status");

    let op = harness.stored().await;
    assert_eq!(op.state, OperationState::Failed);
    assert_eq!(op.last_error.reason, Reason::PROVISIONER_NIL_LAST_ERROR);
    assert_eq!(op.last_error.component, Component::PROVISIONER);
    assert_eq!(op.last_error.step, "Check_Runtime");

    // a failed operation is never picked up again
    assert_eq!(harness.execute().await.unwrap(), Duration::ZERO);
    assert!(harness.control_plane.writes().is_empty());
}

#[tokio::test]
async fn test_operation_past_provisioning_timeout_fails() {
    let harness = Harness::new(config(KimConfig::default()));
    store_instance(&harness.storage, create_test_instance("azure")).await;
    let op = aged(create_test_operation("azure"), Duration::from_secs(7 * 3600));
    store_operation(&harness.storage, op).await;

    let err = harness.execute().await.unwrap_err();
    assert!(matches!(err, EngineError::Failed(_)));

    let op = harness.stored().await;
    assert_eq!(op.state, OperationState::Failed);
    assert_eq!(op.last_error.reason, Reason::KEB_TIMEOUT);
    assert_eq!(op.last_error.component, Component::KEB);
    assert_eq!(harness.provisioner.calls(), 0);
}

fn sm_credentials() -> SmOperatorCredentials {
    SmOperatorCredentials {
        client_id: "cid".to_string(),
        client_secret: "cs".to_string(),
        url: "https://auth.example.com".to_string(),
        sm_url: "https://sm.example.com".to_string(),
        xsappname: String::new(),
    }
}

#[tokio::test]
async fn test_btp_operator_credentials_reach_the_runtime() {
    let harness = Harness::with_kubeconfig_secrets(config(KimConfig::default()));
    store_instance(&harness.storage, create_test_instance("azure")).await;
    let mut op = create_test_operation_with_runtime("azure");
    op.provisioning_parameters.ers_context.sm_operator_credentials = Some(sm_credentials());
    store_operation(&harness.storage, op).await;
    harness
        .provisioner
        .set_operation(PROVISIONER_OPERATION_ID, succeeded(Some(RUNTIME_ID.to_string())));
    harness.provisioner.set_kubeconfig(RUNTIME_ID, Some(KUBECONFIG));
    let runtime = harness.connector.register(KUBECONFIG);

    assert_eq!(harness.execute().await.unwrap(), Duration::ZERO);

    let op = harness.stored().await;
    assert_eq!(op.state, OperationState::Succeeded);
    assert!(!op.instance_details.service_manager_cluster_id.is_empty());
    // the stored provisioner operation was reused
    assert!(harness.provisioner.provision_requests().is_empty());
    assert!(runtime.has_namespace("kyma-system"));
    let secret = runtime.secret("kyma-system", "sap-btp-manager").unwrap();
    let data = secret.data.unwrap();
    assert_eq!(data["clientid"].0, b"cid");
    assert_eq!(data["sm_url"].0, b"https://sm.example.com");
    assert_eq!(
        data["cluster_id"].0,
        op.instance_details.service_manager_cluster_id.as_bytes()
    );
}

#[tokio::test]
async fn test_own_cluster_with_btp_credentials_uses_synced_kubeconfig() {
    let harness = Harness::with_kubeconfig_secrets(config(KimConfig::default()));
    store_instance(&harness.storage, create_test_instance("own_cluster")).await;
    let mut op = create_test_operation("own_cluster");
    op.state = OperationState::Pending;
    op.provisioning_parameters.parameters.kubeconfig = Some(KUBECONFIG.to_string());
    op.provisioning_parameters.ers_context.sm_operator_credentials = Some(sm_credentials());
    store_operation(&harness.storage, op).await;
    let runtime = harness.connector.register(KUBECONFIG);

    assert_eq!(harness.execute().await.unwrap(), Duration::ZERO);

    let op = harness.stored().await;
    assert_eq!(op.state, OperationState::Succeeded);
    assert_eq!(harness.provisioner.calls(), 0);
    assert!(
        harness
            .control_plane
            .secret("kyma-system", &format!("kubeconfig-{}", op.runtime_id()))
            .is_some()
    );
    assert!(runtime.secret("kyma-system", "sap-btp-manager").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_runs_on_spawned_task() {
    let harness = Harness::new(config(KimConfig::default()));
    harness.seed("azure").await;
    let storage = harness.storage.clone();
    let manager = Arc::new(harness.manager);

    let handle = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.execute(OPERATION_ID).await }
    });

    assert_eq!(handle.await.unwrap().unwrap(), Duration::from_secs(20));
    let op = storage.get_operation_by_id(OPERATION_ID).await.unwrap();
    assert_eq!(op.state, OperationState::InProgress);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queue_drives_operation_to_completion() {
    init_test_tracing();
    let harness = Harness::new(config(KimConfig::default()));
    store_instance(&harness.storage, create_test_instance("own_cluster")).await;
    let mut op = create_test_operation("own_cluster");
    op.provisioning_parameters.parameters.kubeconfig = Some(KUBECONFIG.to_string());
    store_operation(&harness.storage, op).await;

    let storage = harness.storage.clone();
    let queue = new_provisioning_queue(harness.manager);
    queue.run(2);
    queue.add(OPERATION_ID);

    let mut state = OperationState::InProgress;
    for _ in 0..100 {
        state = storage.get_operation_by_id(OPERATION_ID).await.unwrap().state;
        if state.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    queue.shutdown().await;

    assert_eq!(state, OperationState::Succeeded);
}
