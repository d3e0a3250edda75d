//! Start/resume guard
//!
//! First step of every provisioning operation. It moves a pending operation
//! to in progress, but only after any deprovisioning of the same instance has
//! finished, and fills in the ERS context fields the caller left out.

use crate::error::Component;
use crate::model::{Operation, OperationState};
use crate::process::{OperationManager, Step, StepOutcome, StepResult};
use crate::storage::{Instances, Operations};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct StartStep {
    operations: Arc<dyn Operations>,
    instances: Arc<dyn Instances>,
    operation_manager: OperationManager,
}

impl StartStep {
    pub const NAME: &'static str = "Starting";

    pub fn new(operations: Arc<dyn Operations>, instances: Arc<dyn Instances>) -> Self {
        Self {
            operation_manager: OperationManager::new(Arc::clone(&operations), Self::NAME, Component::KEB),
            operations,
            instances,
        }
    }
}

#[async_trait::async_trait]
impl Step for StartStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, mut operation: Operation) -> StepResult {
        if operation.state != OperationState::Pending {
            return Ok(StepOutcome::done(operation));
        }

        match self
            .operations
            .get_deprovisioning_operation_by_instance_id(&operation.instance_id)
            .await
        {
            Ok(deprovisioning) if deprovisioning.state == OperationState::InProgress => {
                info!(
                    "Waiting for deprovisioning operation {} of instance {} to finish",
                    deprovisioning.id, operation.instance_id
                );
                return Ok(StepOutcome::retry_after(operation, Duration::from_secs(60)));
            }
            Ok(deprovisioning) => {
                info!(
                    "Instance {} was deprovisioned by operation {}, restoring instance details",
                    operation.instance_id, deprovisioning.id
                );
                match self.instances.get_by_id(&operation.instance_id).await {
                    Ok(instance) => operation.instance_details = instance.instance_details,
                    Err(e) if e.is_not_found() => {
                        return self
                            .operation_manager
                            .operation_failed(operation, "The instance does not exists", Some(&e))
                            .await;
                    }
                    Err(e) => {
                        error!("Unable to get instance {}: {}", operation.instance_id, e);
                        return Ok(StepOutcome::retry_after(operation, Duration::from_secs(1)));
                    }
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                error!(
                    "Unable to get deprovisioning operation for instance {}: {}",
                    operation.instance_id, e
                );
                return Ok(StepOutcome::retry_after(operation, Duration::from_secs(1)));
            }
        }

        let previous_ers_context = match self.operations.get_last_operation(&operation.instance_id).await {
            Ok(last) => Some(last.provisioning_parameters.ers_context),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                error!("Unable to get last operation of instance {}: {}", operation.instance_id, e);
                return Ok(StepOutcome::retry_after(operation, Duration::from_secs(60)));
            }
        };

        let outcome = self
            .operation_manager
            .update_operation(operation, move |op| {
                if let Some(previous) = &previous_ers_context {
                    let current = std::mem::take(&mut op.provisioning_parameters.ers_context);
                    op.provisioning_parameters.ers_context = current.inherit_missing(previous);
                }
                op.state = OperationState::InProgress;
            })
            .await;
        if !outcome.is_done() {
            return Ok(StepOutcome::retry_after(outcome.operation, Duration::from_secs(1)));
        }

        info!("Operation {} switched to state {}", outcome.operation.id, outcome.operation.state);
        Ok(outcome)
    }
}
