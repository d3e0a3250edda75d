//! Durable records the engine reads and writes.
//!
//! An `Operation` is passed by value through the pipeline: each step receives
//! a snapshot and hands back a new one. The `version` field is the only
//! synchronization primitive between workers.

use crate::error::LastError;
use crate::plans;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// License types that opt out of the enterprise policy filter
const EXTERNAL_LICENSE_TYPES: [&str; 3] = ["CUSTOMER", "PARTNER", "TRIAL"];

/// Kind of pipeline an operation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    #[default]
    Provision,
    Deprovision,
    Update,
    Upgrade,
}

/// Operation lifecycle state
///
/// Transitions only Pending -> InProgress -> {Succeeded, Failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OperationState {
    #[default]
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

impl OperationState {
    /// Succeeded and Failed are sticky
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        })
    }
}

/// Cloud provider a runtime is created on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloudProvider {
    Azure,
    #[serde(rename = "AWS")]
    Aws,
    #[serde(rename = "GCP")]
    Gcp,
    SapConvergedCloud,
    #[serde(rename = "unknown")]
    Unknown,
}

impl CloudProvider {
    /// Value used in the `kyma-project.io/provider` label
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Azure => "Azure",
            Self::Aws => "AWS",
            Self::Gcp => "GCP",
            Self::SapConvergedCloud => "SapConvergedCloud",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service Manager credentials handed to the BTP operator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmOperatorCredentials {
    #[serde(rename = "clientid")]
    pub client_id: String,
    #[serde(rename = "clientsecret")]
    pub client_secret: String,
    pub url: String,
    pub sm_url: String,
    #[serde(default)]
    pub xsappname: String,
}

/// Tenancy context supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErsContext {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default, rename = "subaccountId")]
    pub sub_account_id: String,
    #[serde(default, rename = "globalaccountId")]
    pub global_account_id: String,
    #[serde(default, rename = "sm_operator_credentials", skip_serializing_if = "Option::is_none")]
    pub sm_operator_credentials: Option<SmOperatorCredentials>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commercial_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl ErsContext {
    /// Customer, partner and trial runtimes are not internal
    pub fn disable_enterprise_policy_filter(&self) -> bool {
        self.license_type
            .as_deref()
            .is_some_and(|l| EXTERNAL_LICENSE_TYPES.contains(&l))
    }

    /// Fill fields the caller left out from a previous context of the same instance
    #[must_use]
    pub fn inherit_missing(mut self, previous: &ErsContext) -> Self {
        if self.sm_operator_credentials.is_none() {
            self.sm_operator_credentials.clone_from(&previous.sm_operator_credentials);
        }
        if self.commercial_model.is_none() {
            self.commercial_model.clone_from(&previous.commercial_model);
        }
        if self.license_type.is_none() {
            self.license_type.clone_from(&previous.license_type);
        }
        if self.origin.is_none() {
            self.origin.clone_from(&previous.origin);
        }
        if self.platform.is_none() {
            self.platform.clone_from(&previous.platform);
        }
        if self.region.is_none() {
            self.region.clone_from(&previous.region);
        }
        self
    }
}

/// A module requested for the Kyma resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDto {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_resource_policy: Option<String>,
}

/// `modules` provisioning parameter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulesDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<ModuleDto>>,
}

/// Custom CIDRs for the shoot network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkingDto {
    #[serde(default)]
    pub nodes_cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods_cidr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services_cidr: Option<String>,
}

/// Plan parameters from the provisioning request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningParametersDto {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zones: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scaler_min: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scaler_max: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_surge: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<i32>,
    #[serde(default, rename = "volumeSizeGb", skip_serializing_if = "Option::is_none")]
    pub volume_size_gb: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shoot_and_seed_same_region: Option<bool>,
    /// Only for `own_cluster`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shoot_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shoot_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<ModulesDto>,
    #[serde(default, rename = "administrators", skip_serializing_if = "Vec::is_empty")]
    pub runtime_administrators: Vec<String>,
    /// Provider chosen by the user for trial and free plans
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<CloudProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networking: Option<NetworkingDto>,
}

/// Everything the caller sent with the provisioning request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningParameters {
    #[serde(rename = "plan_id")]
    pub plan_id: String,
    #[serde(default, rename = "service_id")]
    pub service_id: String,
    #[serde(default, rename = "ers_context")]
    pub ers_context: ErsContext,
    #[serde(default)]
    pub parameters: ProvisioningParametersDto,
    #[serde(default)]
    pub platform_region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_provider: Option<CloudProvider>,
}

/// DNS provider configured for the shoot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsProvider {
    pub domains_include: Vec<String>,
    pub primary: bool,
    pub secret_name: String,
    #[serde(rename = "type")]
    pub provider_type: String,
}

/// Runtime facts shared between the operation and its instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDetails {
    #[serde(default)]
    pub runtime_id: String,
    #[serde(default)]
    pub shoot_name: String,
    #[serde(default)]
    pub shoot_domain: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shoot_dns_providers: Vec<DnsProvider>,
    #[serde(default)]
    pub eu_access: bool,
    #[serde(default)]
    pub kubeconfig: String,
    #[serde(default)]
    pub kyma_resource_namespace: String,
    #[serde(default)]
    pub kyma_resource_name: String,
    #[serde(default)]
    pub runtime_resource_name: String,
    #[serde(default, rename = "serviceManagerClusterID")]
    pub service_manager_cluster_id: String,
}

/// The durable unit of pipeline work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: String,
    #[serde(default)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub instance_id: String,
    #[serde(default)]
    pub provisioner_operation_id: String,
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    pub state: OperationState,
    #[serde(default)]
    pub description: String,
    pub provisioning_parameters: ProvisioningParameters,
    #[serde(flatten)]
    pub instance_details: InstanceDetails,
    /// Hyperscaler region the runtime ended up in
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub kyma_template: String,
    #[serde(default)]
    pub last_error: LastError,
    #[serde(default)]
    pub finished_stages: Vec<String>,
    /// Steps that gave up retrying without failing the operation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub executed_but_not_completed: Vec<String>,
}

impl Operation {
    /// A fresh provisioning operation in state Pending
    pub fn new_provisioning(
        id: impl Into<String>,
        instance_id: impl Into<String>,
        parameters: ProvisioningParameters,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            version: 0,
            created_at: now,
            updated_at: now,
            instance_id: instance_id.into(),
            provisioner_operation_id: String::new(),
            operation_type: OperationType::Provision,
            state: OperationState::Pending,
            description: "Operation created".to_string(),
            provisioning_parameters: parameters,
            instance_details: InstanceDetails::default(),
            region: String::new(),
            kyma_template: String::new(),
            last_error: LastError::default(),
            finished_stages: Vec::new(),
            executed_but_not_completed: Vec::new(),
        }
    }

    /// Runtime id, once generated
    pub fn runtime_id(&self) -> &str {
        &self.instance_details.runtime_id
    }

    /// Plan name for the operation's plan id, empty when unknown
    pub fn plan_name(&self) -> &'static str {
        plans::plan_name(&self.provisioning_parameters.plan_id).unwrap_or_default()
    }

    /// Whether a stage has already been completed
    pub fn is_stage_finished(&self, stage: &str) -> bool {
        self.finished_stages.iter().any(|s| s == stage)
    }

    /// Wall-clock time since the last persisted update
    pub fn time_since_update(&self) -> Duration {
        elapsed_since(self.updated_at)
    }

    /// Wall-clock time since the operation was created
    pub fn time_since_creation(&self) -> Duration {
        elapsed_since(self.created_at)
    }
}

/// Durable record of a managed environment, shared with other pipelines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub instance_id: String,
    #[serde(default)]
    pub runtime_id: String,
    #[serde(default)]
    pub global_account_id: String,
    #[serde(default)]
    pub sub_account_id: String,
    #[serde(default)]
    pub service_plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<CloudProvider>,
    #[serde(default)]
    pub provider_region: String,
    #[serde(default)]
    pub parameters: ProvisioningParameters,
    #[serde(default)]
    pub instance_details: InstanceDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

impl Instance {
    /// Instance record as the ingress creates it for a provisioning request
    pub fn from_parameters(instance_id: impl Into<String>, parameters: ProvisioningParameters) -> Self {
        let now = Utc::now();
        Self {
            instance_id: instance_id.into(),
            runtime_id: String::new(),
            global_account_id: parameters.ers_context.global_account_id.clone(),
            sub_account_id: parameters.ers_context.sub_account_id.clone(),
            service_plan_id: parameters.plan_id.clone(),
            provider: None,
            provider_region: String::new(),
            parameters,
            instance_details: InstanceDetails::default(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}

/// Elapsed wall-clock time, zero if `at` lies in the future
pub fn elapsed_since(at: DateTime<Utc>) -> Duration {
    (Utc::now() - at).to_std().unwrap_or_default()
}
