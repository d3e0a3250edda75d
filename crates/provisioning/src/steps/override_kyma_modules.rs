//! Module selection for the Kyma resource
//!
//! The `modules` provisioning parameter decides what ends up in
//! `spec.modules` of the template:
//!
//! | `default` | `list`    | `spec.modules`            |
//! |-----------|-----------|---------------------------|
//! | absent    | absent    | template defaults          |
//! | `true`    | any       | template defaults          |
//! | `false`   | any       | `[]`                       |
//! | absent    | `[]`      | `[]`                       |
//! | absent    | non-empty | the list, empty fields dropped |

use super::kyma_template;
use crate::error::Component;
use crate::model::{Operation, OperationType};
use crate::process::{OperationManager, Step, StepResult};
use crate::storage::Operations;
use std::sync::Arc;
use tracing::info;

pub struct OverrideKymaModulesStep {
    operation_manager: OperationManager,
}

impl OverrideKymaModulesStep {
    pub const NAME: &'static str = "Override_Kyma_Modules";

    pub fn new(operations: Arc<dyn Operations>) -> Self {
        Self {
            operation_manager: OperationManager::new(operations, Self::NAME, Component::KEB),
        }
    }
}

#[async_trait::async_trait]
impl Step for OverrideKymaModulesStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, operation: Operation) -> StepResult {
        if operation.operation_type != OperationType::Provision {
            return self.operation_manager.done(operation);
        }

        let Some(modules) =
            kyma_template::module_override(operation.provisioning_parameters.parameters.modules.as_ref())
        else {
            info!("Default Kyma modules kept for operation {}", operation.id);
            return self.operation_manager.done(operation);
        };

        let mut object = match kyma_template::decode(&operation.kyma_template) {
            Ok(object) => object,
            Err(e) => {
                return self
                    .operation_manager
                    .operation_failed(
                        operation,
                        "while decoding Kyma template from previous step",
                        Some(super::cause(&e)),
                    )
                    .await;
            }
        };
        info!("Setting {} Kyma module(s) for operation {}", modules.len(), operation.id);
        if let Err(e) = kyma_template::set_modules(&mut object, modules) {
            let message = format!("unable to append modules to Kyma template: {e}");
            return self
                .operation_manager
                .operation_failed(operation, &message, Some(super::cause(&e)))
                .await;
        }
        let template = match kyma_template::encode(&object) {
            Ok(template) => template,
            Err(e) => {
                return self
                    .operation_manager
                    .operation_failed(
                        operation,
                        "unable to create yaml Kyma template within added modules",
                        Some(super::cause(&e)),
                    )
                    .await;
            }
        };
        let namespace = kyma_template::namespace(&object).to_string();

        Ok(self
            .operation_manager
            .update_operation(operation, move |op| {
                op.kyma_template = template;
                // frozen once recorded
                if op.instance_details.kyma_resource_namespace.is_empty() {
                    op.instance_details.kyma_resource_namespace = namespace;
                }
            })
            .await)
    }
}
