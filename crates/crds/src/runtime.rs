//! Runtime CRD
//!
//! Describes the desired managed cluster to the infrastructure manager.
//! The engine only ever creates this resource; reconciling it into a real
//! shoot is the infrastructure manager's job.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label telling the infrastructure manager whether the legacy provisioner still owns the shoot
pub const LABEL_CONTROLLED_BY_PROVISIONER: &str = "kyma-project.io/controlled-by-provisioner";

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructuremanager.kyma-project.io",
    version = "v1",
    kind = "Runtime",
    namespaced,
    status = "RuntimeStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSpec {
    /// Shoot cluster definition
    pub shoot: RuntimeShoot,

    /// Access and network policy for the cluster
    pub security: Security,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeShoot {
    /// Shoot name, unique within the Gardener project
    pub name: String,

    /// Gardener shoot purpose (`production`, `evaluation`, ...)
    pub purpose: String,

    /// BTP region the runtime was ordered in
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub platform_region: String,

    /// Hyperscaler region
    pub region: String,

    /// Gardener secret binding holding the hyperscaler credentials
    pub secret_binding_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_seed_location: Option<bool>,

    pub kubernetes: Kubernetes,

    pub provider: Provider,

    pub networking: Networking,

    pub control_plane: ControlPlane,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Kubernetes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    /// Gardener provider type (`aws`, `azure`, `gcp`, `openstack`)
    #[serde(rename = "type")]
    pub provider_type: String,

    pub workers: Vec<Worker>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub name: String,

    pub machine: Machine,

    pub minimum: i32,

    pub maximum: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_surge: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<i32>,

    #[serde(default)]
    pub zones: Vec<String>,

    /// Not set for `openstack`, which uses the flavour's disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Volume>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    #[serde(rename = "type")]
    pub machine_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<MachineImage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineImage {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,

    /// Size with unit, e.g. `80Gi`
    pub volume_size: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Networking {
    pub pods: String,

    pub services: String,

    pub nodes: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub networking_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlane {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<HighAvailability>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HighAvailability {
    pub failure_tolerance: FailureTolerance,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FailureTolerance {
    /// `zone` or `node`
    #[serde(rename = "type")]
    pub tolerance_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Security {
    /// Users granted cluster-admin on the runtime
    pub administrators: Vec<String>,

    pub networking: NetworkingSecurity,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkingSecurity {
    pub filter: Filter,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub egress: Egress,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<Ingress>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Egress {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ingress {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    /// Provisioning state reported by the infrastructure manager
    #[serde(default)]
    pub state: RuntimeState,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<RuntimeCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeCondition {
    #[serde(rename = "type")]
    pub condition_type: String,

    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Runtime provisioning state
///
/// Serializes as PascalCase ("Ready", "Failed", ...). Unknown states coming
/// from newer infrastructure-manager versions deserialize as `Unknown`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum RuntimeState {
    /// Accepted, shoot not ready yet
    #[default]
    Pending,

    /// Shoot is ready
    Ready,

    /// Provisioning failed
    Failed,

    /// Deletion in progress
    Terminating,

    #[serde(other)]
    Unknown,
}
