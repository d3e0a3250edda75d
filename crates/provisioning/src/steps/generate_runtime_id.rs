use crate::error::Component;
use crate::model::Operation;
use crate::process::{OperationManager, Step, StepOutcome, StepResult};
use crate::storage::{Instances, Operations, StorageError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Assigns the runtime id and mirrors it to the instance
///
/// A conflicting instance write is retried once against a freshly read
/// instance; a second failure backs off for a minute instead of going
/// unnoticed.
pub struct GenerateRuntimeIdStep {
    instances: Arc<dyn Instances>,
    operation_manager: OperationManager,
}

impl GenerateRuntimeIdStep {
    pub const NAME: &'static str = "Generate_Runtime_ID";

    pub fn new(operations: Arc<dyn Operations>, instances: Arc<dyn Instances>) -> Self {
        Self {
            instances,
            operation_manager: OperationManager::new(operations, Self::NAME, Component::KEB),
        }
    }

    /// Mirror the runtime id to the instance unless it is already there
    async fn update_instance(&self, instance_id: &str, runtime_id: &str) -> Result<(), StorageError> {
        let mut instance = self.instances.get_by_id(instance_id).await?;
        if instance.runtime_id == runtime_id {
            return Ok(());
        }
        instance.runtime_id = runtime_id.to_string();
        self.instances.update(instance).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl Step for GenerateRuntimeIdStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, operation: Operation) -> StepResult {
        let operation = if operation.runtime_id().is_empty() {
            let runtime_id = uuid::Uuid::new_v4().to_string();
            info!("RuntimeID {} generated", runtime_id);
            let outcome = self
                .operation_manager
                .update_operation(operation, move |op| {
                    op.instance_details.runtime_id = runtime_id;
                    op.provisioner_operation_id = String::new();
                })
                .await;
            if !outcome.is_done() {
                return Ok(StepOutcome::retry_after(outcome.operation, Duration::from_secs(5)));
            }
            outcome.operation
        } else {
            info!("RuntimeID already set {}", operation.runtime_id());
            operation
        };
        let runtime_id = operation.runtime_id().to_string();

        let result = match self.update_instance(&operation.instance_id, &runtime_id).await {
            Err(e) if e.is_conflict() => {
                warn!("Conflict while updating instance {}, retrying once: {}", operation.instance_id, e);
                self.update_instance(&operation.instance_id, &runtime_id).await
            }
            other => other,
        };
        if let Err(e) = result {
            error!("Unable to update instance {} with RuntimeID: {}", operation.instance_id, e);
            return Ok(StepOutcome::retry_after(operation, Duration::from_secs(60)));
        }

        self.operation_manager.done(operation)
    }
}
