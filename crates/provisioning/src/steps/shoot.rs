//! Shoot settings shared by the provisioner request and the Runtime resource
//!
//! Plan defaults come from [`crate::provider::values_for`]; whatever the
//! caller put into the provisioning parameters takes precedence.

use crate::model::Operation;
use crate::provider::Values;

pub const DEFAULT_NODES_CIDR: &str = "10.250.0.0/16";
pub const DEFAULT_PODS_CIDR: &str = "100.64.0.0/12";
pub const DEFAULT_SERVICES_CIDR: &str = "100.104.0.0/13";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShootSettings {
    pub machine_type: String,
    pub auto_scaler_min: i32,
    pub auto_scaler_max: i32,
    pub max_surge: i32,
    pub max_unavailable: i32,
    pub zones: Vec<String>,
    /// Zero when the provider takes the disk from the machine flavour
    pub volume_size_gb: i32,
    pub nodes_cidr: String,
    pub pods_cidr: String,
    pub services_cidr: String,
    pub administrators: Vec<String>,
}

impl ShootSettings {
    pub fn resolve(operation: &Operation, values: &Values) -> Self {
        let parameters = &operation.provisioning_parameters.parameters;
        let networking = parameters.networking.as_ref();
        let administrators = if parameters.runtime_administrators.is_empty() {
            let user_id = &operation.provisioning_parameters.ers_context.user_id;
            if user_id.is_empty() {
                Vec::new()
            } else {
                vec![user_id.clone()]
            }
        } else {
            parameters.runtime_administrators.clone()
        };

        Self {
            machine_type: parameters
                .machine_type
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| values.default_machine_type.clone()),
            auto_scaler_min: parameters.auto_scaler_min.unwrap_or(values.default_auto_scaler_min),
            auto_scaler_max: parameters.auto_scaler_max.unwrap_or(values.default_auto_scaler_max),
            max_surge: parameters
                .max_surge
                .unwrap_or_else(|| i32::try_from(values.zones_count).unwrap_or(1)),
            max_unavailable: parameters.max_unavailable.unwrap_or(0),
            zones: if parameters.zones.is_empty() {
                values.zones.clone()
            } else {
                parameters.zones.clone()
            },
            volume_size_gb: parameters.volume_size_gb.unwrap_or(values.volume_size_gb),
            nodes_cidr: networking
                .map(|n| n.nodes_cidr.clone())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_NODES_CIDR.to_string()),
            pods_cidr: networking
                .and_then(|n| n.pods_cidr.clone())
                .unwrap_or_else(|| DEFAULT_PODS_CIDR.to_string()),
            services_cidr: networking
                .and_then(|n| n.services_cidr.clone())
                .unwrap_or_else(|| DEFAULT_SERVICES_CIDR.to_string()),
            administrators,
        }
    }
}
