//! ProvisionerClient trait for mocking
//!
//! The concrete `ProvisionerClient` implements this trait, and tests use
//! `MockProvisionerClient` from the `test-util` feature.

use crate::error::ProvisionerError;
use crate::models::{OperationStatus, ProvisionRuntimeInput, RuntimeStatus};

/// Trait for provisioner API operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ProvisionerClientTrait: Send + Sync {
    /// Start provisioning a runtime; returns the provisioner operation
    async fn provision_runtime(
        &self,
        global_account_id: &str,
        sub_account_id: &str,
        input: ProvisionRuntimeInput,
    ) -> Result<OperationStatus, ProvisionerError>;

    /// Status of a provisioner operation
    async fn runtime_operation_status(
        &self,
        global_account_id: &str,
        operation_id: &str,
    ) -> Result<OperationStatus, ProvisionerError>;

    /// Status of a runtime, including its kubeconfig once available
    async fn runtime_status(
        &self,
        global_account_id: &str,
        runtime_id: &str,
    ) -> Result<RuntimeStatus, ProvisionerError>;
}
