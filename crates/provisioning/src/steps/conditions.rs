//! Conditions deciding whether a step applies to an operation

use crate::config::KimConfig;
use crate::model::Operation;
use crate::plans;
use crate::process::StepCondition;
use std::sync::Arc;

pub fn skip_for_trial_plan() -> StepCondition {
    Arc::new(|op: &Operation| !plans::is_trial_plan(&op.provisioning_parameters.plan_id))
}

pub fn enable_for_trial_plan() -> StepCondition {
    Arc::new(|op: &Operation| plans::is_trial_plan(&op.provisioning_parameters.plan_id))
}

pub fn skip_for_own_cluster_plan() -> StepCondition {
    Arc::new(|op: &Operation| !plans::is_own_cluster_plan(&op.provisioning_parameters.plan_id))
}

pub fn do_for_own_cluster_plan_only() -> StepCondition {
    Arc::new(|op: &Operation| plans::is_own_cluster_plan(&op.provisioning_parameters.plan_id))
}

/// The caller handed over Service Manager credentials for the BTP operator
pub fn when_btp_operator_credentials_provided() -> StepCondition {
    Arc::new(|op: &Operation| {
        op.provisioning_parameters
            .ers_context
            .sm_operator_credentials
            .is_some()
    })
}

/// Steps that depend on the legacy provisioner
pub fn skip_for_kim_only(kim: KimConfig) -> StepCondition {
    Arc::new(move |op: &Operation| !kim.is_driven_by_kim_only(op.plan_name()))
}

pub fn all_of(conditions: Vec<StepCondition>) -> StepCondition {
    Arc::new(move |op: &Operation| conditions.iter().all(|condition| condition(op)))
}
