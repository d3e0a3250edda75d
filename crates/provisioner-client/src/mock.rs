//! Mock ProvisionerClient for unit testing
//!
//! Stores operations and runtimes in memory. Tests seed state with the
//! `set_*` helpers and drive operations with `finish_operation`.

use crate::error::{GraphQlError, ProvisionerError};
use crate::models::{
    OperationState, OperationStatus, OperationType, ProvisionRuntimeInput, RuntimeConfig,
    RuntimeStatus,
};
use crate::provisioner_trait::ProvisionerClientTrait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock ProvisionerClient for testing
#[derive(Debug, Clone, Default)]
pub struct MockProvisionerClient {
    pub(crate) operations: Arc<Mutex<HashMap<String, OperationStatus>>>,
    pub(crate) runtimes: Arc<Mutex<HashMap<String, RuntimeStatus>>>,
    pub(crate) provision_requests: Arc<Mutex<Vec<ProvisionRuntimeInput>>>,
    pub(crate) graphql_error: Arc<Mutex<Option<GraphQlError>>>,
    pub(crate) unavailable: Arc<Mutex<bool>>,
    pub(crate) calls: Arc<Mutex<u32>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockProvisionerClient {
    /// Create a new mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation status (for test setup)
    pub fn set_operation(&self, operation_id: impl Into<String>, status: OperationStatus) {
        lock(&self.operations).insert(operation_id.into(), status);
    }

    /// Change the state of a known operation
    pub fn finish_operation(&self, operation_id: &str, state: OperationState) {
        if let Some(op) = lock(&self.operations).get_mut(operation_id) {
            op.state = state;
        }
    }

    /// Register a runtime kubeconfig (for test setup)
    pub fn set_kubeconfig(&self, runtime_id: impl Into<String>, kubeconfig: Option<&str>) {
        lock(&self.runtimes).insert(
            runtime_id.into(),
            RuntimeStatus {
                runtime_configuration: Some(RuntimeConfig {
                    kubeconfig: kubeconfig.map(str::to_string),
                }),
            },
        );
    }

    /// Make every call fail with this GraphQL error
    pub fn fail_with(&self, error: GraphQlError) {
        *lock(&self.graphql_error) = Some(error);
    }

    /// Simulate a transport failure on every call
    pub fn set_unavailable(&self, unavailable: bool) {
        *lock(&self.unavailable) = unavailable;
    }

    /// Number of calls made so far
    pub fn calls(&self) -> u32 {
        *lock(&self.calls)
    }

    /// Inputs passed to `provision_runtime`
    pub fn provision_requests(&self) -> Vec<ProvisionRuntimeInput> {
        lock(&self.provision_requests).clone()
    }

    fn check_available(&self) -> Result<(), ProvisionerError> {
        *lock(&self.calls) += 1;
        if *lock(&self.unavailable) {
            return Err(ProvisionerError::Status {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        if let Some(err) = lock(&self.graphql_error).clone() {
            return Err(ProvisionerError::GraphQl(err));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProvisionerClientTrait for MockProvisionerClient {
    async fn provision_runtime(
        &self,
        _global_account_id: &str,
        _sub_account_id: &str,
        input: ProvisionRuntimeInput,
    ) -> Result<OperationStatus, ProvisionerError> {
        self.check_available()?;
        let operation_id = uuid::Uuid::new_v4().to_string();
        let runtime_id = input
            .runtime_input
            .labels
            .as_ref()
            .and_then(|l| l.get("runtime_id"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let status = OperationStatus {
            id: Some(operation_id.clone()),
            operation: OperationType::ProvisionNoInstall,
            state: OperationState::InProgress,
            message: Some("Operation scheduled".to_string()),
            runtime_id,
            last_error: None,
        };
        lock(&self.provision_requests).push(input);
        lock(&self.operations).insert(operation_id, status.clone());
        Ok(status)
    }

    async fn runtime_operation_status(
        &self,
        _global_account_id: &str,
        operation_id: &str,
    ) -> Result<OperationStatus, ProvisionerError> {
        self.check_available()?;
        lock(&self.operations)
            .get(operation_id)
            .cloned()
            .ok_or_else(|| {
                ProvisionerError::GraphQl(GraphQlError::new(format!(
                    "operation {operation_id} not found"
                )))
            })
    }

    async fn runtime_status(
        &self,
        _global_account_id: &str,
        runtime_id: &str,
    ) -> Result<RuntimeStatus, ProvisionerError> {
        self.check_available()?;
        Ok(lock(&self.runtimes)
            .get(runtime_id)
            .cloned()
            .unwrap_or_default())
    }
}
