use crate::error::Component;
use crate::model::{CloudProvider, Operation};
use crate::plans;
use crate::process::{OperationManager, Step, StepResult};
use crate::storage::{Instances, Operations};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Records on the instance which cloud provider the runtime lives on
pub struct InitialisationStep {
    instances: Arc<dyn Instances>,
    operation_manager: OperationManager,
}

impl InitialisationStep {
    pub const NAME: &'static str = "Provision_Initialization";

    pub fn new(operations: Arc<dyn Operations>, instances: Arc<dyn Instances>) -> Self {
        Self {
            instances,
            operation_manager: OperationManager::new(operations, Self::NAME, Component::KEB),
        }
    }
}

#[async_trait::async_trait]
impl Step for InitialisationStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, operation: Operation) -> StepResult {
        let parameters = &operation.provisioning_parameters;
        if plans::is_own_cluster_plan(&parameters.plan_id) {
            return self.operation_manager.done(operation);
        }

        let provider = plans::provider_for(parameters);
        if provider == CloudProvider::Unknown {
            let message = format!("unable to determine cloud provider for plan {}", parameters.plan_id);
            return self.operation_manager.operation_failed(operation, &message, None).await;
        }

        let mut instance = match self.instances.get_by_id(&operation.instance_id).await {
            Ok(instance) => instance,
            Err(e) => {
                return self
                    .operation_manager
                    .retry_operation(
                        operation,
                        "unable to get instance",
                        Some(&e),
                        Duration::from_secs(1),
                        Duration::from_secs(5),
                    )
                    .await;
            }
        };
        if instance.provider == Some(provider) {
            return self.operation_manager.done(operation);
        }

        instance.provider = Some(provider);
        if let Err(e) = self.instances.update(instance).await {
            return self
                .operation_manager
                .retry_operation(
                    operation,
                    "unable to update instance",
                    Some(&e),
                    Duration::from_secs(1),
                    Duration::from_secs(5),
                )
                .await;
        }
        info!("Instance {} runs on {}", operation.instance_id, provider);
        self.operation_manager.done(operation)
    }
}
