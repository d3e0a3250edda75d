//! Provisioner GraphQL client
//!
//! Implements the calls against the provisioner's `/graphql` endpoint.
//! Every request carries the global account id in the `tenant` header.

use crate::common::GraphQlHttpClient;
use crate::error::ProvisionerError;
use crate::models::{OperationStatus, ProvisionRuntimeInput, RuntimeStatus};
use crate::provisioner_trait::ProvisionerClientTrait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const OPERATION_STATUS_FIELDS: &str = "id operation state message runtimeID lastError { errMessage reason component }";

/// Provisioner API client
#[derive(Debug, Clone)]
pub struct ProvisionerClient {
    http: GraphQlHttpClient,
}

impl ProvisionerClient {
    /// Create a new provisioner client
    ///
    /// # Arguments
    /// * `endpoint` - GraphQL endpoint (e.g., "http://provisioner:3000/graphql")
    pub fn new(endpoint: String) -> Result<Self, ProvisionerError> {
        Self::with_timeout(endpoint, Duration::from_secs(30))
    }

    /// Create a new provisioner client with a custom request timeout
    pub fn with_timeout(endpoint: String, timeout: Duration) -> Result<Self, ProvisionerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProvisionerError::Http)?;

        Ok(Self {
            http: GraphQlHttpClient::new(client, endpoint),
        })
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> &str {
        self.http.endpoint()
    }
}

#[async_trait::async_trait]
impl ProvisionerClientTrait for ProvisionerClient {
    async fn provision_runtime(
        &self,
        global_account_id: &str,
        sub_account_id: &str,
        input: ProvisionRuntimeInput,
    ) -> Result<OperationStatus, ProvisionerError> {
        debug!(
            "Provisioning runtime {} for sub-account {}",
            input.runtime_input.name, sub_account_id
        );
        let query = format!(
            "mutation ($config: ProvisionRuntimeInput!) {{ result: provisionRuntime(config: $config) {{ {OPERATION_STATUS_FIELDS} }} }}"
        );
        let variables = serde_json::json!({ "config": serde_json::to_value(&input)? });
        self.http.execute(global_account_id, &query, variables).await
    }

    async fn runtime_operation_status(
        &self,
        global_account_id: &str,
        operation_id: &str,
    ) -> Result<OperationStatus, ProvisionerError> {
        let query = format!(
            "query ($id: String!) {{ result: runtimeOperationStatus(id: $id) {{ {OPERATION_STATUS_FIELDS} }} }}"
        );
        self.http
            .execute(global_account_id, &query, serde_json::json!({ "id": operation_id }))
            .await
    }

    async fn runtime_status(
        &self,
        global_account_id: &str,
        runtime_id: &str,
    ) -> Result<RuntimeStatus, ProvisionerError> {
        let query = "query ($id: String!) { result: runtimeStatus(id: $id) { runtimeConfiguration { kubeconfig } } }";
        self.http
            .execute(global_account_id, query, serde_json::json!({ "id": runtime_id }))
            .await
    }
}
