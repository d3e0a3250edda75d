//! Publishes the runtime kubeconfig for the lifecycle manager
//!
//! The kubeconfig fetched by `Get_Kubeconfig` lives on the in-memory operation
//! only. This step stores it in the `kubeconfig-<kyma name>` secret next to the
//! Kyma resource, which is where the lifecycle manager and
//! [`KubeconfigSecretClientProvider`](crate::k8s::KubeconfigSecretClientProvider)
//! look for it. An existing secret is brought up to date.

use crate::error::Component;
use crate::k8s::client::{KUBECONFIG_SECRET_KEY, kubeconfig_secret_name};
use crate::k8s::{ControlPlaneClient, ControlPlaneError};
use crate::model::Operation;
use crate::process::{OperationManager, Step, StepResult};
use crate::steps::labels;
use crate::storage::Operations;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const RETRY_INTERVAL: Duration = Duration::from_secs(60);
const RETRY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Kyma name the secret is derived from
fn kyma_name(operation: &Operation) -> String {
    let name = &operation.instance_details.kyma_resource_name;
    if name.is_empty() {
        operation.runtime_id().to_lowercase()
    } else {
        name.clone()
    }
}

/// Kubeconfig secret for the operation's runtime
pub fn kubeconfig_secret(operation: &Operation) -> Secret {
    let annotations = labels::kyma_annotations(operation);
    Secret {
        metadata: ObjectMeta {
            name: Some(kubeconfig_secret_name(&kyma_name(operation))),
            namespace: Some(operation.instance_details.kyma_resource_namespace.clone()),
            labels: Some(labels::kyma_labels(operation)),
            annotations: (!annotations.is_empty()).then_some(annotations),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            KUBECONFIG_SECRET_KEY.to_string(),
            ByteString(operation.instance_details.kubeconfig.as_bytes().to_vec()),
        )])),
        ..Default::default()
    }
}

pub struct SyncKubeconfigStep {
    control_plane: Arc<dyn ControlPlaneClient>,
    operation_manager: OperationManager,
}

impl SyncKubeconfigStep {
    pub const NAME: &'static str = "Sync_Kubeconfig";

    pub fn new(operations: Arc<dyn Operations>, control_plane: Arc<dyn ControlPlaneClient>) -> Self {
        Self {
            control_plane,
            operation_manager: OperationManager::new(operations, Self::NAME, Component::KEB),
        }
    }

    async fn create_or_update(&self, secret: &Secret) -> Result<(), ControlPlaneError> {
        let namespace = secret.metadata.namespace.as_deref().unwrap_or_default();
        let name = secret.metadata.name.as_deref().unwrap_or_default();
        self.control_plane.ensure_namespace(namespace).await?;

        match self.control_plane.get_secret(namespace, name).await {
            Ok(existing) => {
                if existing.data == secret.data && labels_cover(&existing, secret) {
                    debug!("Kubeconfig secret {}/{} is up to date", namespace, name);
                    return Ok(());
                }
                let mut updated = existing;
                let mut merged = updated.metadata.labels.take().unwrap_or_default();
                labels::merge(&mut merged, secret.metadata.labels.clone().unwrap_or_default());
                updated.metadata.labels = Some(merged);
                updated.data.clone_from(&secret.data);
                updated.string_data = None;
                self.control_plane.update_secret(&updated).await?;
                info!("Kubeconfig secret {}/{} updated", namespace, name);
            }
            Err(e) if e.is_not_found() => {
                self.control_plane.create_secret(secret).await?;
                info!("Kubeconfig secret {}/{} created", namespace, name);
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

fn labels_cover(existing: &Secret, desired: &Secret) -> bool {
    let current = existing.metadata.labels.as_ref();
    desired
        .metadata
        .labels
        .iter()
        .flatten()
        .all(|(k, v)| current.and_then(|l| l.get(k)) == Some(v))
}

#[async_trait::async_trait]
impl Step for SyncKubeconfigStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, operation: Operation) -> StepResult {
        // the infrastructure manager publishes the secret itself on KIM-only plans
        if operation.instance_details.kubeconfig.is_empty() {
            info!("No kubeconfig on the operation, nothing to sync");
            return self.operation_manager.done(operation);
        }

        let secret = kubeconfig_secret(&operation);
        if let Err(e) = self.create_or_update(&secret).await {
            let message = format!(
                "failed to sync kubeconfig secret {}/{} for lifecycle manager",
                secret.metadata.namespace.as_deref().unwrap_or_default(),
                secret.metadata.name.as_deref().unwrap_or_default()
            );
            return self
                .operation_manager
                .retry_operation(operation, &message, Some(&e), RETRY_INTERVAL, RETRY_TIMEOUT)
                .await;
        }
        self.operation_manager.done(operation)
    }
}
