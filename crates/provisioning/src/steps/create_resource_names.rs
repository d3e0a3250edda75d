use crate::error::Component;
use crate::model::Operation;
use crate::process::{OperationManager, Step, StepResult};
use crate::storage::Operations;
use std::sync::Arc;

/// Names the Kyma and Runtime resources after the runtime id
pub struct CreateResourceNamesStep {
    operation_manager: OperationManager,
}

impl CreateResourceNamesStep {
    pub const NAME: &'static str = "Create_Resource_Names";

    pub fn new(operations: Arc<dyn Operations>) -> Self {
        Self {
            operation_manager: OperationManager::new(operations, Self::NAME, Component::KEB),
        }
    }
}

#[async_trait::async_trait]
impl Step for CreateResourceNamesStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, operation: Operation) -> StepResult {
        if operation.runtime_id().is_empty() {
            return self
                .operation_manager
                .operation_failed(
                    operation,
                    "RuntimeID not set, cannot create Kyma resource name and Runtime resource name",
                    None,
                )
                .await;
        }

        let name = operation.runtime_id().to_lowercase();
        let details = &operation.instance_details;
        if details.kyma_resource_name == name && details.runtime_resource_name == name {
            return self.operation_manager.done(operation);
        }

        Ok(self
            .operation_manager
            .update_operation(operation, move |op| {
                op.instance_details.kyma_resource_name.clone_from(&name);
                op.instance_details.runtime_resource_name = name;
            })
            .await)
    }
}
