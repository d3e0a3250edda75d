//! Cluster creation through the legacy provisioner
//!
//! Asks the provisioner for a cluster without Kyma installed and remembers
//! its operation id, which is what `Check_Runtime` polls later.

use super::shoot::ShootSettings;
use crate::config::Config;
use crate::error::Component;
use crate::model::Operation;
use crate::process::{OperationManager, Step, StepResult};
use crate::provider::{Values, values_for};
use crate::storage::Operations;
use provisioner_client::{
    ClusterConfigInput, GardenerConfigInput, ProvisionRuntimeInput, ProvisionerClientTrait,
    ProvisionerError, RuntimeInput,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct CreateRuntimeWithoutKymaStep {
    provisioner: Arc<dyn ProvisionerClientTrait>,
    config: Config,
    operation_manager: OperationManager,
}

impl CreateRuntimeWithoutKymaStep {
    pub const NAME: &'static str = "Create_Runtime_Without_Kyma";

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

    fn provision_input(&self, operation: &Operation, values: &Values) -> ProvisionRuntimeInput {
        let parameters = &operation.provisioning_parameters;
        let shoot = ShootSettings::resolve(operation, values);

        ProvisionRuntimeInput {
            runtime_input: RuntimeInput {
                name: parameters.parameters.name.clone(),
                description: Some(format!(
                    "{} runtime for global account {}",
                    operation.plan_name(),
                    parameters.ers_context.global_account_id
                )),
                labels: Some(json!({
                    "broker_instance_id": operation.instance_id,
                    "global_subaccount_id": parameters.ers_context.sub_account_id,
                    "runtime_id": operation.runtime_id(),
                    "broker_plan_id": parameters.plan_id,
                    "broker_plan_name": operation.plan_name(),
                })),
            },
            cluster_config: ClusterConfigInput {
                gardener_config: GardenerConfigInput {
                    name: operation.instance_details.shoot_name.clone(),
                    kubernetes_version: Some(self.config.kubernetes_version.clone()),
                    provider: values.provider_type.to_string(),
                    target_secret: parameters.parameters.target_secret.clone().unwrap_or_default(),
                    region: values.region.clone(),
                    machine_type: shoot.machine_type,
                    disk_type: Some(values.disk_type.clone()).filter(|d| !d.is_empty()),
                    volume_size_gb: Some(shoot.volume_size_gb).filter(|v| *v > 0),
                    worker_cidr: shoot.nodes_cidr,
                    autoscaler_min: shoot.auto_scaler_min,
                    autoscaler_max: shoot.auto_scaler_max,
                    max_surge: shoot.max_surge,
                    max_unavailable: shoot.max_unavailable,
                    purpose: Some(values.purpose.clone()),
                    zones: shoot.zones,
                },
                administrators: shoot.administrators,
            },
        }
    }
}

#[async_trait::async_trait]
impl Step for CreateRuntimeWithoutKymaStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn component(&self) -> Component {
        Component::PROVISIONER
    }

    async fn run(&self, operation: Operation) -> StepResult {
        if !operation.provisioner_operation_id.is_empty() {
            info!(
                "Provisioner operation {} already started, skipping",
                operation.provisioner_operation_id
            );
            return self.operation_manager.done(operation);
        }

        let values = match values_for(&operation.provisioning_parameters, &self.config) {
            Ok(values) => values,
            Err(e) => {
                return self
                    .operation_manager
                    .operation_failed(operation, "unable to determine provider values", Some(&e))
                    .await;
            }
        };
        let input = self.provision_input(&operation, &values);
        let ers = &operation.provisioning_parameters.ers_context;

        info!("Requesting runtime {} from the provisioner", operation.runtime_id());
        let status = match self
            .provisioner
            .provision_runtime(&ers.global_account_id, &ers.sub_account_id, input)
            .await
        {
            Ok(status) => status,
            Err(e @ ProvisionerError::GraphQl(_)) => {
                return self
                    .operation_manager
                    .operation_failed(operation, "call to provisioner failed", Some(&e))
                    .await;
            }
            Err(e) => {
                return self
                    .operation_manager
                    .retry_operation(
                        operation,
                        "call to provisioner failed",
                        Some(&e),
                        Duration::from_secs(10),
                        Duration::from_secs(300),
                    )
                    .await;
            }
        };

        let Some(provisioner_operation_id) = status.id else {
            return self
                .operation_manager
                .operation_failed(operation, "provisioner returned no operation ID", None)
                .await;
        };
        info!("Provisioner operation {} started", provisioner_operation_id);

        Ok(self
            .operation_manager
            .update_operation(operation, move |op| {
                op.provisioner_operation_id = provisioner_operation_id;
            })
            .await)
    }
}
