//! Fetches the admin kubeconfig of the new cluster
//!
//! The kubeconfig is kept on the in-memory operation only; it is never
//! written to the operation store and is fetched again whenever the
//! operation resumes. `Sync_Kubeconfig` publishes it as a secret.

use crate::config::Config;
use crate::error::Component;
use crate::model::Operation;
use crate::plans;
use crate::process::{OperationManager, Step, StepOutcome, StepResult};
use crate::storage::Operations;
use provisioner_client::ProvisionerClientTrait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const STATUS_ERROR_BACKOFF: Duration = Duration::from_secs(60);
const SHORT_KUBECONFIG_BACKOFF: Duration = Duration::from_secs(30);
const MIN_KUBECONFIG_LEN: usize = 10;

pub struct GetKubeconfigStep {
    provisioner: Arc<dyn ProvisionerClientTrait>,
    config: Config,
    operation_manager: OperationManager,
}

impl GetKubeconfigStep {
    pub const NAME: &'static str = "Get_Kubeconfig";

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

#[async_trait::async_trait]
impl Step for GetKubeconfigStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn component(&self) -> Component {
        Component::PROVISIONER
    }

    async fn run(&self, mut operation: Operation) -> StepResult {
        if self.config.kim.is_driven_by_kim_only(operation.plan_name()) {
            info!("Plan {} is driven by KIM only, kubeconfig is not read from the provisioner", operation.plan_name());
            return self.operation_manager.done(operation);
        }
        if !operation.instance_details.kubeconfig.is_empty() {
            return self.operation_manager.done(operation);
        }

        if plans::is_own_cluster_plan(&operation.provisioning_parameters.plan_id) {
            operation.instance_details.kubeconfig = operation
                .provisioning_parameters
                .parameters
                .kubeconfig
                .clone()
                .unwrap_or_default();
            return self.operation_manager.done(operation);
        }

        if operation.runtime_id().is_empty() {
            return self
                .operation_manager
                .operation_failed(operation, "Runtime ID is empty", None)
                .await;
        }

        let global_account_id = &operation.provisioning_parameters.ers_context.global_account_id;
        let status = match self.provisioner.runtime_status(global_account_id, operation.runtime_id()).await {
            Ok(status) => status,
            Err(e) => {
                error!("Call to provisioner RuntimeStatus failed: {}", e);
                return Ok(StepOutcome::retry_after(operation, STATUS_ERROR_BACKOFF));
            }
        };

        let kubeconfig = match status.kubeconfig() {
            Some(kubeconfig) => kubeconfig.to_string(),
            None => {
                warn!("Kubeconfig for runtime {} is not available yet", operation.runtime_id());
                return Ok(StepOutcome::retry_after(operation, STATUS_ERROR_BACKOFF));
            }
        };
        if kubeconfig.len() < MIN_KUBECONFIG_LEN {
            warn!("Kubeconfig for runtime {} is too short, waiting for a complete one", operation.runtime_id());
            return Ok(StepOutcome::retry_after(operation, SHORT_KUBECONFIG_BACKOFF));
        }

        operation.instance_details.kubeconfig = kubeconfig;
        self.operation_manager.done(operation)
    }
}
