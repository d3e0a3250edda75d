//! Waits for the infrastructure manager to report the Runtime resource ready
//!
//! Only meaningful when the resource was really written, so the step is a
//! no-op in view-only and dry-run mode.

use crate::config::Config;
use crate::error::Component;
use crate::k8s::ControlPlaneClient;
use crate::model::Operation;
use crate::process::{OperationManager, Step, StepOutcome, StepResult};
use crate::storage::Operations;
use crds::{Runtime, RuntimeState, RuntimeStatus};
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct CheckRuntimeResourceStep {
    control_plane: Arc<dyn ControlPlaneClient>,
    config: Config,
    operation_manager: OperationManager,
}

impl CheckRuntimeResourceStep {
    pub const NAME: &'static str = "Check_RuntimeResource";

    pub fn new(
        operations: Arc<dyn Operations>,
        control_plane: Arc<dyn ControlPlaneClient>,
        config: Config,
    ) -> Self {
        Self {
            control_plane,
            config,
            operation_manager: OperationManager::new(operations, Self::NAME, Component::INFRASTRUCTURE_MANAGER),
        }
    }
}

/// Status of a fetched Runtime; absent or unreadable status counts as pending
fn runtime_state(object: &DynamicObject) -> RuntimeState {
    object
        .data
        .get("status")
        .cloned()
        .and_then(|status| serde_json::from_value::<RuntimeStatus>(status).ok())
        .map(|status| status.state)
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl Step for CheckRuntimeResourceStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn component(&self) -> Component {
        Component::INFRASTRUCTURE_MANAGER
    }

    async fn run(&self, operation: Operation) -> StepResult {
        let kim = &self.config.kim;
        if !kim.is_enabled_for_plan(operation.plan_name()) || kim.view_only || kim.dry_run {
            debug!("Runtime resource is not driven by KIM for plan {}, skipping", operation.plan_name());
            return self.operation_manager.done(operation);
        }

        let namespace = operation.instance_details.kyma_resource_namespace.clone();
        let name = operation.instance_details.runtime_resource_name.clone();
        let resource = ApiResource::erase::<Runtime>(&());
        let object = match self.control_plane.get(&resource, &namespace, &name).await {
            Ok(object) => object,
            Err(e) => {
                return self
                    .operation_manager
                    .retry_operation(
                        operation,
                        "unable to get Runtime resource",
                        Some(&e),
                        Duration::from_secs(1),
                        Duration::from_secs(10),
                    )
                    .await;
            }
        };

        match runtime_state(&object) {
            RuntimeState::Ready => {
                info!("Runtime resource {}/{} is ready", namespace, name);
                return self.operation_manager.done(operation);
            }
            RuntimeState::Failed => {
                return self
                    .operation_manager
                    .operation_failed(operation, "Runtime resource in failed state", None)
                    .await;
            }
            state => debug!("Runtime resource {}/{} is {:?}", namespace, name, state),
        }

        if operation.time_since_update() > self.config.check_runtime_resource_timeout {
            let message = format!("Waiting for Runtime resource ({namespace}/{name}) ready state timeout.");
            return self.operation_manager.operation_failed(operation, &message, None).await;
        }
        Ok(StepOutcome::retry_after(operation, POLL_INTERVAL))
    }
}
