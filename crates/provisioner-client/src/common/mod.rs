//! Common utilities for the provisioner GraphQL client
//!
//! Wraps the HTTP transport and the GraphQL response envelope.

use crate::error::{GraphQlError, ProvisionerError};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Header carrying the global account the request is made for
pub const TENANT_HEADER: &str = "tenant";

/// GraphQL response envelope
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

/// Queries alias their root field as `result`
#[derive(Debug, Deserialize)]
pub struct ResultField<T> {
    pub result: Option<T>,
}

/// HTTP client wrapper posting GraphQL documents to a single endpoint
#[derive(Debug, Clone)]
pub struct GraphQlHttpClient {
    client: Client,
    endpoint: String,
}

impl GraphQlHttpClient {
    /// Create a new GraphQL client wrapper
    pub fn new(client: Client, endpoint: String) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run a query or mutation on behalf of `tenant` and return the `result` field
    pub async fn execute<T: DeserializeOwned>(
        &self,
        tenant: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ProvisionerError> {
        debug!("POST {} for tenant {}", self.endpoint, tenant);

        let response = self
            .client
            .post(&self.endpoint)
            .header(TENANT_HEADER, tenant)
            .header("Accept", "application/json")
            .json(&serde_json::json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(ProvisionerError::Http)?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProvisionerError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        decode_envelope(&body)
    }
}

/// Decode a GraphQL envelope, surfacing the first error if there is one
pub fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<T, ProvisionerError> {
    let envelope: GraphQlResponse<ResultField<T>> = serde_json::from_str(body)?;

    if let Some(first) = envelope.errors.into_iter().next() {
        return Err(ProvisionerError::GraphQl(first));
    }

    envelope
        .data
        .and_then(|d| d.result)
        .ok_or_else(|| ProvisionerError::InvalidResponse("response has no result".to_string()))
}
