//! Service plan catalogue
//!
//! Plan ids are stable identifiers sent by the OSB caller; plan names are what
//! configuration (`kim.plans`, `kim.kim_only_plans`) and labels refer to.

use crate::model::{CloudProvider, ProvisioningParameters};

pub const GCP_PLAN_ID: &str = "ca6e5357-707f-4565-bbbd-b3ab732597c6";
pub const GCP_PLAN_NAME: &str = "gcp";
pub const AWS_PLAN_ID: &str = "361c511f-f939-4621-b228-d0fb79a1fe15";
pub const AWS_PLAN_NAME: &str = "aws";
pub const AZURE_PLAN_ID: &str = "4deee563-e5ec-4731-b9b1-53b42d855f0c";
pub const AZURE_PLAN_NAME: &str = "azure";
pub const AZURE_LITE_PLAN_ID: &str = "8cb22518-aa26-44c5-91a0-e669ec9bf443";
pub const AZURE_LITE_PLAN_NAME: &str = "azure_lite";
pub const TRIAL_PLAN_ID: &str = "7d55d31d-35ae-4438-bf13-6ffdfa107d9f";
pub const TRIAL_PLAN_NAME: &str = "trial";
pub const SAP_CONVERGED_CLOUD_PLAN_ID: &str = "03b812ac-c991-4528-b5bd-08b303523a63";
pub const SAP_CONVERGED_CLOUD_PLAN_NAME: &str = "sap-converged-cloud";
pub const FREEMIUM_PLAN_ID: &str = "b1a5764e-2ea1-4f95-94c0-2b4538b37b55";
pub const FREEMIUM_PLAN_NAME: &str = "free";
pub const OWN_CLUSTER_PLAN_ID: &str = "03e3cb66-a4c6-4c6a-b4b0-5d42224debea";
pub const OWN_CLUSTER_PLAN_NAME: &str = "own_cluster";
pub const PREVIEW_PLAN_ID: &str = "5cb3d976-b85c-42ea-a636-79cadda109a9";
pub const PREVIEW_PLAN_NAME: &str = "preview";

const PLANS: [(&str, &str); 9] = [
    (GCP_PLAN_ID, GCP_PLAN_NAME),
    (AWS_PLAN_ID, AWS_PLAN_NAME),
    (AZURE_PLAN_ID, AZURE_PLAN_NAME),
    (AZURE_LITE_PLAN_ID, AZURE_LITE_PLAN_NAME),
    (TRIAL_PLAN_ID, TRIAL_PLAN_NAME),
    (SAP_CONVERGED_CLOUD_PLAN_ID, SAP_CONVERGED_CLOUD_PLAN_NAME),
    (FREEMIUM_PLAN_ID, FREEMIUM_PLAN_NAME),
    (OWN_CLUSTER_PLAN_ID, OWN_CLUSTER_PLAN_NAME),
    (PREVIEW_PLAN_ID, PREVIEW_PLAN_NAME),
];

/// Plan name for a plan id
pub fn plan_name(plan_id: &str) -> Option<&'static str> {
    PLANS.iter().find(|(id, _)| *id == plan_id).map(|(_, name)| *name)
}

/// Plan id for a plan name
pub fn plan_id(plan_name: &str) -> Option<&'static str> {
    PLANS.iter().find(|(_, name)| *name == plan_name).map(|(id, _)| *id)
}

pub fn is_trial_plan(plan_id: &str) -> bool {
    plan_id == TRIAL_PLAN_ID
}

pub fn is_own_cluster_plan(plan_id: &str) -> bool {
    plan_id == OWN_CLUSTER_PLAN_ID
}

pub fn is_sap_converged_cloud_plan(plan_id: &str) -> bool {
    plan_id == SAP_CONVERGED_CLOUD_PLAN_ID
}

pub fn is_preview_plan(plan_id: &str) -> bool {
    plan_id == PREVIEW_PLAN_ID
}

/// Cloud provider the runtime is created on
///
/// Trial and free plans honour the provider requested by the user and fall
/// back to AWS.
pub fn provider_for(parameters: &ProvisioningParameters) -> CloudProvider {
    match parameters.plan_id.as_str() {
        AZURE_PLAN_ID | AZURE_LITE_PLAN_ID => CloudProvider::Azure,
        AWS_PLAN_ID | PREVIEW_PLAN_ID => CloudProvider::Aws,
        GCP_PLAN_ID => CloudProvider::Gcp,
        SAP_CONVERGED_CLOUD_PLAN_ID => CloudProvider::SapConvergedCloud,
        TRIAL_PLAN_ID | FREEMIUM_PLAN_ID => parameters
            .parameters
            .provider
            .or(parameters.platform_provider)
            .unwrap_or(CloudProvider::Aws),
        _ => CloudProvider::Unknown,
    }
}
