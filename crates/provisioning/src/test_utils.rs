//! Test utilities for unit testing steps
//!
//! Helpers for creating operations, instances and stores in a known state.

use crate::model::{ErsContext, Instance, Operation, OperationState, ProvisioningParameters};
use crate::plans;
use crate::storage::{Instances, MemoryStorage, Operations};
use chrono::Utc;
use std::time::Duration;

pub const OPERATION_ID: &str = "operation-id";
pub const INSTANCE_ID: &str = "instance-id";
pub const RUNTIME_ID: &str = "runtime-inst-id";
pub const GLOBAL_ACCOUNT_ID: &str = "global-account-id";
pub const SUB_ACCOUNT_ID: &str = "subaccount-id";
pub const PROVISIONER_OPERATION_ID: &str = "provisioner-operation-id";
pub const SHOOT_NAME: &str = "c-12345";
pub const PLATFORM_REGION: &str = "cf-eu10";

/// Install a test subscriber once; output is captured per test
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Provisioning parameters for a plan name (`azure`, `preview`, ...)
pub fn create_test_parameters(plan_name: &str) -> ProvisioningParameters {
    ProvisioningParameters {
        plan_id: plans::plan_id(plan_name).unwrap_or_default().to_string(),
        service_id: "47c9dcbf-ff30-448e-ab36-d3bad66ba281".to_string(),
        ers_context: ErsContext {
            tenant_id: GLOBAL_ACCOUNT_ID.to_string(),
            global_account_id: GLOBAL_ACCOUNT_ID.to_string(),
            sub_account_id: SUB_ACCOUNT_ID.to_string(),
            license_type: Some("CUSTOMER".to_string()),
            ..Default::default()
        },
        platform_region: PLATFORM_REGION.to_string(),
        ..Default::default()
    }
}

/// In-progress provisioning operation for a plan name
pub fn create_test_operation(plan_name: &str) -> Operation {
    let mut operation =
        Operation::new_provisioning(OPERATION_ID, INSTANCE_ID, create_test_parameters(plan_name));
    operation.state = OperationState::InProgress;
    operation.description = "Operation in progress".to_string();
    operation.instance_details.shoot_name = SHOOT_NAME.to_string();
    operation
}

/// Same as [`create_test_operation`] with runtime id and resource names filled in
pub fn create_test_operation_with_runtime(plan_name: &str) -> Operation {
    let mut operation = create_test_operation(plan_name);
    operation.instance_details.runtime_id = RUNTIME_ID.to_string();
    operation.instance_details.kyma_resource_name = RUNTIME_ID.to_string();
    operation.instance_details.runtime_resource_name = RUNTIME_ID.to_string();
    operation.instance_details.kyma_resource_namespace = "kyma-system".to_string();
    operation.provisioner_operation_id = PROVISIONER_OPERATION_ID.to_string();
    operation
}

/// Instance matching [`create_test_operation`]
pub fn create_test_instance(plan_name: &str) -> Instance {
    Instance::from_parameters(INSTANCE_ID, create_test_parameters(plan_name))
}

/// Move both timestamps of an operation into the past
pub fn aged(mut operation: Operation, age: Duration) -> Operation {
    let shifted = Utc::now() - chrono::Duration::from_std(age).unwrap_or_default();
    operation.created_at = shifted;
    operation.updated_at = shifted;
    operation
}

/// Store an operation and return it as stored
pub async fn store_operation(storage: &MemoryStorage, operation: Operation) -> Operation {
    storage
        .insert_operation(operation.clone())
        .await
        .unwrap_or_else(|e| panic!("inserting operation {}: {e}", operation.id));
    operation
}

/// Store an instance and return it as stored
pub async fn store_instance(storage: &MemoryStorage, instance: Instance) -> Instance {
    storage
        .insert(instance.clone())
        .await
        .unwrap_or_else(|e| panic!("inserting instance {}: {e}", instance.instance_id));
    instance
}
