//! Polls the provisioner until the cluster it is building is ready

use crate::config::Config;
use crate::error::{Component, LastError, OPERATION_TIMEOUT_MSG, Reason};
use crate::model::Operation;
use crate::process::{OperationManager, Step, StepOutcome, StepResult};
use crate::storage::Operations;
use provisioner_client::{OperationState, ProvisionerClientTrait};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const STATUS_ERROR_BACKOFF: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_secs(20);

pub struct CheckRuntimeStep {
    provisioner: Arc<dyn ProvisionerClientTrait>,
    config: Config,
    operation_manager: OperationManager,
}

impl CheckRuntimeStep {
    pub const NAME: &'static str = "Check_Runtime";

    pub fn new(
        operations: Arc<dyn Operations>,
        provisioner: Arc<dyn ProvisionerClientTrait>,
        config: Config,
    ) -> Self {
        Self {
            provisioner,
            config,
            operation_manager: OperationManager::new(operations, Self::NAME, Component::PROVISIONER),
        }
    }
}

/// Attribution for a failed provisioner operation
fn provisioner_last_error(reported: Option<&provisioner_client::LastError>) -> LastError {
    match reported {
        Some(e) => LastError::new(
            e.err_message.clone(),
            Reason::new(e.reason.clone()),
            Component::new(e.component.clone()),
        ),
        None => LastError::new(
            "provisioner returned nil LastError",
            Reason::PROVISIONER_NIL_LAST_ERROR,
            Component::PROVISIONER,
        ),
    }
}

#[async_trait::async_trait]
impl Step for CheckRuntimeStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn component(&self) -> Component {
        Component::PROVISIONER
    }

    async fn run(&self, operation: Operation) -> StepResult {
        if operation.runtime_id().is_empty() {
            return self
                .operation_manager
                .operation_failed(operation, "Runtime ID is empty", None)
                .await;
        }
        if self.config.kim.is_driven_by_kim_only(operation.plan_name()) {
            info!("Plan {} is driven by KIM only, nothing to check in the provisioner", operation.plan_name());
            return self.operation_manager.done(operation);
        }

        let timeout = self.config.provisioning_timeout;
        if operation.time_since_update() > timeout {
            let message = format!("{OPERATION_TIMEOUT_MSG}: {timeout:?}");
            return self.operation_manager.operation_failed(operation, &message, None).await;
        }
        if operation.provisioner_operation_id.is_empty() {
            return self
                .operation_manager
                .operation_failed(operation, "Operation does not contain Provisioner Operation ID", None)
                .await;
        }

        let global_account_id = &operation.provisioning_parameters.ers_context.global_account_id;
        let status = match self
            .provisioner
            .runtime_operation_status(global_account_id, &operation.provisioner_operation_id)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                error!(
                    "Call to provisioner about operation {} failed: {}",
                    operation.provisioner_operation_id, e
                );
                return Ok(StepOutcome::retry_after(operation, STATUS_ERROR_BACKOFF));
            }
        };
        info!("Provisioner operation {} is {}", operation.provisioner_operation_id, status.state);

        match status.state {
            OperationState::Succeeded => self.operation_manager.done(operation),
            OperationState::InProgress | OperationState::Pending => {
                Ok(StepOutcome::retry_after(operation, POLL_INTERVAL))
            }
            OperationState::Failed => {
                let cause = provisioner_last_error(status.last_error.as_ref());
                self.operation_manager
                    .operation_failed(operation, "provisioner client returns failed status", Some(&cause))
                    .await
            }
            OperationState::Other(state) => {
                let message = format!("unsupported provisioner client status: {state}");
                self.operation_manager.operation_failed(operation, &message, None).await
            }
        }
    }
}
