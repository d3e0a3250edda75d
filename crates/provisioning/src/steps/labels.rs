//! Labels and annotations the engine puts on control-plane resources

use crate::model::Operation;
use crate::plans;
use std::collections::BTreeMap;

pub const INSTANCE_ID_LABEL: &str = "kyma-project.io/instance-id";
pub const RUNTIME_ID_LABEL: &str = "kyma-project.io/runtime-id";
pub const PLAN_ID_LABEL: &str = "kyma-project.io/broker-plan-id";
pub const PLAN_NAME_LABEL: &str = "kyma-project.io/broker-plan-name";
pub const GLOBAL_ACCOUNT_ID_LABEL: &str = "kyma-project.io/global-account-id";
pub const SUBACCOUNT_ID_LABEL: &str = "kyma-project.io/subaccount-id";
pub const SHOOT_NAME_LABEL: &str = "kyma-project.io/shoot-name";
pub const REGION_LABEL: &str = "kyma-project.io/region";
pub const PLATFORM_REGION_LABEL: &str = "kyma-project.io/platform-region";
pub const PROVIDER_LABEL: &str = "kyma-project.io/provider";
pub const KYMA_NAME_LABEL: &str = "operator.kyma-project.io/kyma-name";
pub const MANAGED_BY_LABEL: &str = "operator.kyma-project.io/managed-by";
pub const INTERNAL_LABEL: &str = "operator.kyma-project.io/internal";

pub const MANAGED_BY_LIFECYCLE_MANAGER: &str = "lifecycle-manager";
pub const SKR_DOMAIN_ANNOTATION: &str = "skr-domain";

/// Labels shared by the Kyma and Runtime resources
fn common_labels(operation: &Operation, kyma_name: &str) -> BTreeMap<String, String> {
    let parameters = &operation.provisioning_parameters;
    let mut labels = BTreeMap::new();
    let mut set = |key: &str, value: &str| {
        labels.insert(key.to_string(), value.to_string());
    };
    set(INSTANCE_ID_LABEL, &operation.instance_id);
    set(RUNTIME_ID_LABEL, operation.runtime_id());
    set(PLAN_ID_LABEL, &parameters.plan_id);
    set(PLAN_NAME_LABEL, operation.plan_name());
    set(GLOBAL_ACCOUNT_ID_LABEL, &parameters.ers_context.global_account_id);
    set(SUBACCOUNT_ID_LABEL, &parameters.ers_context.sub_account_id);
    set(SHOOT_NAME_LABEL, &operation.instance_details.shoot_name);
    set(KYMA_NAME_LABEL, kyma_name);
    labels
}

/// Labels of the Kyma resource
pub fn kyma_labels(operation: &Operation) -> BTreeMap<String, String> {
    let parameters = &operation.provisioning_parameters;
    let mut labels = common_labels(operation, &operation.instance_details.kyma_resource_name);
    if !operation.region.is_empty() {
        labels.insert(REGION_LABEL.to_string(), operation.region.clone());
    }
    if !parameters.platform_region.is_empty() {
        labels.insert(PLATFORM_REGION_LABEL.to_string(), parameters.platform_region.clone());
    }
    labels.insert(
        PROVIDER_LABEL.to_string(),
        plans::provider_for(parameters).as_str().to_string(),
    );
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_LIFECYCLE_MANAGER.to_string());
    if !parameters.ers_context.disable_enterprise_policy_filter() {
        labels.insert(INTERNAL_LABEL.to_string(), "true".to_string());
    }
    labels
}

/// Labels of the Runtime resource
pub fn runtime_labels(
    operation: &Operation,
    region: &str,
    controlled_by_provisioner: bool,
) -> BTreeMap<String, String> {
    let mut labels = common_labels(operation, &operation.instance_details.kyma_resource_name);
    labels.insert(REGION_LABEL.to_string(), region.to_string());
    labels.insert(
        crds::LABEL_CONTROLLED_BY_PROVISIONER.to_string(),
        controlled_by_provisioner.to_string(),
    );
    labels
}

/// Annotations of the Kyma resource
pub fn kyma_annotations(operation: &Operation) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    if !operation.instance_details.shoot_domain.is_empty() {
        annotations.insert(
            SKR_DOMAIN_ANNOTATION.to_string(),
            operation.instance_details.shoot_domain.clone(),
        );
    }
    annotations
}

/// Merge `extra` into `target`, returning whether anything changed
pub fn merge(target: &mut BTreeMap<String, String>, extra: BTreeMap<String, String>) -> bool {
    let mut changed = false;
    for (key, value) in extra {
        if target.get(&key) != Some(&value) {
            target.insert(key, value);
            changed = true;
        }
    }
    changed
}
