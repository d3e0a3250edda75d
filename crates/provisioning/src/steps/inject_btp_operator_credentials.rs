//! Hands the caller's Service Manager credentials to the BTP operator
//!
//! Writes the `sap-btp-manager` secret into the new cluster. The cluster id
//! stored in the secret is generated once and kept on the operation, so a
//! retried run writes the same secret again.

use crate::error::{Component, TemporaryError};
use crate::k8s::{ControlPlaneClient, ControlPlaneError, RuntimeClientProvider};
use crate::model::{Operation, SmOperatorCredentials};
use crate::process::{OperationManager, Step, StepOutcome, StepResult};
use crate::storage::Operations;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const BTP_MANAGER_SECRET_NAME: &str = "sap-btp-manager";
pub const BTP_MANAGER_SECRET_NAMESPACE: &str = "kyma-system";

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const WATCHED_BY_LABEL: &str = "app.kubernetes.io/watched-by";
const LABEL_VALUE: &str = "kcp-kyma-environment-broker";
const WARNING_ANNOTATION: &str = "Warning";
const WARNING_TEXT: &str = "This secret is generated. Do not edit!";

const APPLY_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretPreparationError {
    #[error("service manager credentials are missing")]
    MissingCredentials,

    #[error("{0} not set in the credentials")]
    MissingField(&'static str),
}

/// BTP manager secret for the given credentials and cluster id
pub fn prepare_secret(
    credentials: Option<&SmOperatorCredentials>,
    cluster_id: &str,
) -> Result<Secret, SecretPreparationError> {
    let credentials = credentials.ok_or(SecretPreparationError::MissingCredentials)?;
    let fields = [
        ("clientid", "client id", &credentials.client_id),
        ("clientsecret", "client secret", &credentials.client_secret),
        ("sm_url", "service manager url", &credentials.sm_url),
        ("tokenurl", "token url", &credentials.url),
    ];

    let mut data = BTreeMap::new();
    for (key, description, value) in fields {
        if value.is_empty() {
            return Err(SecretPreparationError::MissingField(description));
        }
        data.insert(key.to_string(), ByteString(value.as_bytes().to_vec()));
    }
    data.insert("cluster_id".to_string(), ByteString(cluster_id.as_bytes().to_vec()));

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(BTP_MANAGER_SECRET_NAME.to_string()),
            namespace: Some(BTP_MANAGER_SECRET_NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([
                (MANAGED_BY_LABEL.to_string(), LABEL_VALUE.to_string()),
                (WATCHED_BY_LABEL.to_string(), LABEL_VALUE.to_string()),
            ])),
            annotations: Some(BTreeMap::from([(
                WARNING_ANNOTATION.to_string(),
                WARNING_TEXT.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    })
}

pub struct InjectBtpOperatorCredentialsStep {
    runtime_clients: Arc<dyn RuntimeClientProvider>,
    operation_manager: OperationManager,
}

impl InjectBtpOperatorCredentialsStep {
    pub const NAME: &'static str = "Inject_BTP_Operator_Credentials";

    pub fn new(operations: Arc<dyn Operations>, runtime_clients: Arc<dyn RuntimeClientProvider>) -> Self {
        Self {
            runtime_clients,
            operation_manager: OperationManager::new(operations, Self::NAME, Component::KEB),
        }
    }

    async fn create_or_update(&self, client: &dyn ControlPlaneClient, secret: &Secret) -> Result<(), ControlPlaneError> {
        client.ensure_namespace(BTP_MANAGER_SECRET_NAMESPACE).await?;
        match client
            .get_secret(BTP_MANAGER_SECRET_NAMESPACE, BTP_MANAGER_SECRET_NAME)
            .await
        {
            Ok(existing) => {
                let mut updated = secret.clone();
                updated.metadata.resource_version = existing.metadata.resource_version;
                client.update_secret(&updated).await?;
                info!("Secret {}/{} updated", BTP_MANAGER_SECRET_NAMESPACE, BTP_MANAGER_SECRET_NAME);
            }
            Err(e) if e.is_not_found() => {
                client.create_secret(secret).await?;
                info!("Secret {}/{} created", BTP_MANAGER_SECRET_NAMESPACE, BTP_MANAGER_SECRET_NAME);
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Step for InjectBtpOperatorCredentialsStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, operation: Operation) -> StepResult {
        if operation.runtime_id().is_empty() {
            return self
                .operation_manager
                .operation_failed(operation, "Runtime ID is empty", None)
                .await;
        }

        let client = match self.runtime_clients.client_for(operation.runtime_id()).await {
            Ok(client) => client,
            Err(e) => {
                return self
                    .operation_manager
                    .retry_operation(
                        operation,
                        "unable to get K8S client",
                        Some(&e),
                        Duration::from_secs(5),
                        Duration::from_secs(2 * 60),
                    )
                    .await;
            }
        };

        let mut operation = operation;
        if operation.instance_details.service_manager_cluster_id.is_empty() {
            let cluster_id = uuid::Uuid::new_v4().to_string();
            let outcome = self
                .operation_manager
                .update_operation(operation, move |op| {
                    op.instance_details.service_manager_cluster_id = cluster_id;
                })
                .await;
            if !outcome.is_done() {
                return Ok(outcome);
            }
            operation = outcome.operation;
        }

        let secret = match prepare_secret(
            operation.provisioning_parameters.ers_context.sm_operator_credentials.as_ref(),
            &operation.instance_details.service_manager_cluster_id,
        ) {
            Ok(secret) => secret,
            Err(e) => {
                return self
                    .operation_manager
                    .operation_failed(operation, "secret preparation failed", Some(&e))
                    .await;
            }
        };

        if let Err(e) = self.create_or_update(client.as_ref(), &secret).await {
            let err = TemporaryError::wrap("failed create/update of the secret", e);
            warn!("{}", err);
            return Ok(StepOutcome::retry_after(operation, APPLY_BACKOFF));
        }
        self.operation_manager.done(operation)
    }
}
