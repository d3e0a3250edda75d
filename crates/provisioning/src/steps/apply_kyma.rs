//! Kyma resource on the control plane
//!
//! Creates the resource from the operation's template. When it already
//! exists only its labels and annotations are brought up to date; its `spec`
//! belongs to the lifecycle manager from then on.

use super::{kyma_template, labels};
use crate::error::Component;
use crate::k8s::{ControlPlaneClient, ControlPlaneError};
use crate::model::Operation;
use crate::process::{OperationManager, Step, StepOutcome, StepResult};
use crate::storage::Operations;
use crds::kyma_api_resource;
use kube::api::DynamicObject;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct ApplyKymaStep {
    control_plane: Arc<dyn ControlPlaneClient>,
    operation_manager: OperationManager,
}

impl ApplyKymaStep {
    pub const NAME: &'static str = "Apply_Kyma";

    pub fn new(operations: Arc<dyn Operations>, control_plane: Arc<dyn ControlPlaneClient>) -> Self {
        Self {
            control_plane,
            operation_manager: OperationManager::new(operations, Self::NAME, Component::LIFECYCLE_MANAGER),
        }
    }

    async fn retry(&self, operation: Operation, message: &str, cause: &ControlPlaneError) -> StepResult {
        self.operation_manager
            .retry_operation(
                operation,
                message,
                Some(cause),
                Duration::from_secs(1),
                Duration::from_secs(10),
            )
            .await
    }
}

/// Copy labels and annotations of `desired` onto `existing`, returning whether anything changed
fn apply_metadata(existing: &mut DynamicObject, desired: &DynamicObject) -> bool {
    let labels_changed = labels::merge(
        existing.metadata.labels.get_or_insert_with(Default::default),
        desired.metadata.labels.clone().unwrap_or_default(),
    );
    let annotations_changed = labels::merge(
        existing.metadata.annotations.get_or_insert_with(Default::default),
        desired.metadata.annotations.clone().unwrap_or_default(),
    );
    labels_changed || annotations_changed
}

#[async_trait::async_trait]
impl Step for ApplyKymaStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn component(&self) -> Component {
        Component::LIFECYCLE_MANAGER
    }

    async fn run(&self, operation: Operation) -> StepResult {
        let mut desired = match kyma_template::decode(&operation.kyma_template) {
            Ok(object) => object,
            Err(e) => {
                return self
                    .operation_manager
                    .operation_failed(operation, "unable to create a kyma template", Some(super::cause(&e)))
                    .await;
            }
        };

        let mut operation = operation;
        if operation.instance_details.kyma_resource_name.is_empty() {
            let name = operation.runtime_id().to_lowercase();
            let outcome = self
                .operation_manager
                .update_operation(operation, move |op| {
                    op.instance_details.kyma_resource_name = name;
                })
                .await;
            if !outcome.is_done() {
                return Ok(StepOutcome::retry_after(outcome.operation, Duration::from_secs(5)));
            }
            operation = outcome.operation;
        }

        let namespace = operation.instance_details.kyma_resource_namespace.clone();
        let name = operation.instance_details.kyma_resource_name.clone();
        desired.metadata.name = Some(name.clone());
        desired.metadata.namespace = Some(namespace.clone());
        desired.metadata.labels = Some(labels::kyma_labels(&operation));
        desired.metadata.annotations = Some(labels::kyma_annotations(&operation));

        let resource = kyma_api_resource();
        match self.control_plane.get(&resource, &namespace, &name).await {
            Ok(mut existing) => {
                if !apply_metadata(&mut existing, &desired) {
                    info!("Kyma resource does not need any change");
                }
                if let Err(e) = self.control_plane.update(&resource, &existing).await {
                    return self.retry(operation, "unable to update a Kyma resource", &e).await;
                }
                info!("Kyma resource {}/{} updated", namespace, name);
            }
            Err(e) if e.is_not_found() => {
                if let Err(e) = self.control_plane.create(&resource, &desired).await {
                    return self.retry(operation, "unable to create a Kyma resource", &e).await;
                }
                info!("Kyma resource {}/{} created", namespace, name);
            }
            Err(e) => return self.retry(operation, "unable to get a Kyma resource", &e).await,
        }

        self.operation_manager.done(operation)
    }
}
