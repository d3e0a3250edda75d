//! Secret binding resolution
//!
//! Trial and SAP Converged Cloud runtimes draw from shared pools, every other
//! plan from a pool keyed by the global account.

use crate::error::Component;
use crate::hyperscaler::{AccountProvider, HyperscalerType, is_eu_restricted_access};
use crate::model::Operation;
use crate::plans;
use crate::process::{OperationManager, Step, StepOutcome, StepResult};
use crate::storage::Operations;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const RETRY_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_TIMEOUT: Duration = Duration::from_secs(600);

pub struct ResolveCredentialsStep {
    accounts: Arc<dyn AccountProvider>,
    default_scc_region: String,
    operation_manager: OperationManager,
}

impl ResolveCredentialsStep {
    pub const NAME: &'static str = "Resolve_Target_Secret";

    pub fn new(
        operations: Arc<dyn Operations>,
        accounts: Arc<dyn AccountProvider>,
        default_scc_region: impl Into<String>,
    ) -> Self {
        Self {
            accounts,
            default_scc_region: default_scc_region.into(),
            operation_manager: OperationManager::new(operations, Self::NAME, Component::ACCOUNT_POOL),
        }
    }
}

#[async_trait::async_trait]
impl Step for ResolveCredentialsStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn component(&self) -> Component {
        Component::ACCOUNT_POOL
    }

    async fn run(&self, operation: Operation) -> StepResult {
        let parameters = &operation.provisioning_parameters;
        let region = parameters
            .parameters
            .region
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.default_scc_region.clone());

        let hyperscaler = match HyperscalerType::from_cloud_provider(
            plans::provider_for(parameters),
            &region,
            &parameters.platform_region,
        ) {
            Ok(hyperscaler) => hyperscaler,
            Err(e) => {
                let message = format!(
                    "failing to determine the type of Hyperscaler to use for planID: {}",
                    parameters.plan_id
                );
                return self.operation_manager.operation_failed(operation, &message, Some(&e)).await;
            }
        };
        let eu_access = is_eu_restricted_access(&parameters.platform_region);
        let global_account_id = parameters.ers_context.global_account_id.clone();

        info!(
            "HAP lookup for secret binding to provision cluster for global account ID {} on Hyperscaler {}, euAccess {}",
            global_account_id, hyperscaler, eu_access
        );
        let lookup = if plans::is_trial_plan(&parameters.plan_id)
            || plans::is_sap_converged_cloud_plan(&parameters.plan_id)
        {
            self.accounts.gardener_shared_secret_name(&hyperscaler, eu_access).await
        } else {
            self.accounts
                .gardener_secret_name(&hyperscaler, &global_account_id, eu_access)
                .await
        };

        let secret_name = match lookup {
            Ok(name) => name,
            Err(e) => {
                let message = format!(
                    "HAP lookup for secret binding to provision cluster for global account ID {global_account_id} on Hyperscaler {hyperscaler} has failed"
                );
                if operation.time_since_update() < RETRY_TIMEOUT {
                    warn!("{}: {}", message, e);
                    return Ok(StepOutcome::retry_after(operation, RETRY_INTERVAL));
                }
                return self.operation_manager.operation_failed(operation, &message, Some(&e)).await;
            }
        };

        info!("Resolved {} as target secret name to use for cluster provisioning", secret_name);
        Ok(self
            .operation_manager
            .update_operation(operation, move |op| {
                op.provisioning_parameters.parameters.target_secret = Some(secret_name);
            })
            .await)
    }
}
