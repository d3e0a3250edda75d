use super::kyma_template;
use crate::error::Component;
use crate::model::Operation;
use crate::process::{OperationManager, Step, StepResult};
use crate::storage::Operations;
use std::sync::Arc;

/// Puts the Kyma template on the operation and freezes its namespace
///
/// The namespace is taken from the template only while the operation has
/// none; a namespace recorded earlier always wins.
pub struct InitKymaTemplateStep {
    default_template: String,
    operation_manager: OperationManager,
}

impl InitKymaTemplateStep {
    pub const NAME: &'static str = "Init_Kyma_Template";

    pub fn new(operations: Arc<dyn Operations>, default_template: impl Into<String>) -> Self {
        Self {
            default_template: default_template.into(),
            operation_manager: OperationManager::new(operations, Self::NAME, Component::KEB),
        }
    }
}

#[async_trait::async_trait]
impl Step for InitKymaTemplateStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, operation: Operation) -> StepResult {
        let template = if operation.kyma_template.is_empty() {
            self.default_template.clone()
        } else {
            operation.kyma_template.clone()
        };

        let object = match kyma_template::decode(&template) {
            Ok(object) => object,
            Err(e) => {
                return self
                    .operation_manager
                    .operation_failed(operation, "unable to create a kyma template", Some(super::cause(&e)))
                    .await;
            }
        };
        let namespace = kyma_template::namespace(&object).to_string();

        Ok(self
            .operation_manager
            .update_operation(operation, move |op| {
                op.kyma_template = template;
                if op.instance_details.kyma_resource_namespace.is_empty() {
                    op.instance_details.kyma_resource_namespace = namespace;
                }
            })
            .await)
    }
}
