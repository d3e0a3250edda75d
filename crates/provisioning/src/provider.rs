//! Plan specific defaults for the shoot described by the Runtime resource
//!
//! Every plan maps to a Gardener provider type with default machine type,
//! autoscaler bounds, region, zones and volume. Request parameters override
//! the defaults in the step building the resource, not here.
//!
//! Zones are picked in table order rather than at random, so building the
//! resource twice for the same operation yields the same object.

use crate::config::Config;
use crate::hyperscaler::is_eu_restricted_access;
use crate::model::{CloudProvider, ProvisioningParameters};
use crate::plans;
use thiserror::Error;

pub const PURPOSE_EVALUATION: &str = "evaluation";
pub const PURPOSE_PRODUCTION: &str = "production";

pub const DEFAULT_AWS_REGION: &str = "eu-central-1";
pub const DEFAULT_AWS_TRIAL_REGION: &str = "eu-west-1";
pub const DEFAULT_EU_ACCESS_AWS_REGION: &str = "eu-central-1";
pub const DEFAULT_AWS_MACHINE_TYPE: &str = "m6i.large";
pub const DEFAULT_AWS_TRIAL_MACHINE_TYPE: &str = "m5.xlarge";

pub const DEFAULT_AZURE_REGION: &str = "eastus";
pub const DEFAULT_EU_ACCESS_AZURE_REGION: &str = "switzerlandnorth";
pub const DEFAULT_AZURE_MACHINE_TYPE: &str = "Standard_D2s_v5";
pub const DEFAULT_AZURE_TRIAL_MACHINE_TYPE: &str = "Standard_D4s_v5";

pub const DEFAULT_GCP_REGION: &str = "europe-west3";
pub const DEFAULT_GCP_ASSURED_WORKLOADS_REGION: &str = "me-central2";
pub const DEFAULT_GCP_MACHINE_TYPE: &str = "n2-standard-2";
pub const DEFAULT_GCP_TRIAL_MACHINE_TYPE: &str = "n2-standard-4";

pub const DEFAULT_SCC_MACHINE_TYPE: &str = "g_c2_m8";

const DEFAULT_MULTI_ZONE_COUNT: usize = 3;

/// Platform region served by GCP assured workloads
const GCP_ASSURED_WORKLOADS_PLATFORM_REGION: &str = "cf-sa30";

/// Zone suffixes per AWS region
const AWS_ZONES: [(&str, &str); 14] = [
    ("eu-central-1", "abc"),
    ("eu-west-1", "abc"),
    ("eu-west-2", "abc"),
    ("ca-central-1", "abd"),
    ("sa-east-1", "abc"),
    ("us-east-1", "abcdf"),
    ("us-west-1", "ab"),
    ("us-west-2", "abcd"),
    ("ap-northeast-1", "acd"),
    ("ap-northeast-2", "ac"),
    ("ap-south-1", "abc"),
    ("ap-southeast-1", "abc"),
    ("ap-southeast-2", "abc"),
    ("us-east-2", "abc"),
];

/// Zone suffixes per SAP Converged Cloud region
const SCC_ZONES: [(&str, &str); 7] = [
    ("eu-de-1", "abd"),
    ("ap-au-1", "ab"),
    ("na-us-1", "abd"),
    ("eu-de-2", "ab"),
    ("na-us-2", "ab"),
    ("ap-jp-1", "a"),
    ("ap-ae-1", "ab"),
];

/// The plan has no shoot defaults
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("plan {0} not supported")]
    UnsupportedPlan(String),

    #[error("{plan} provider for {provider} is not supported")]
    UnsupportedProvider { plan: &'static str, provider: String },
}

/// Shoot defaults for one plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Values {
    pub default_auto_scaler_max: i32,
    pub default_auto_scaler_min: i32,
    pub zones_count: usize,
    pub zones: Vec<String>,
    /// Gardener provider type (`aws`, `azure`, `gcp`, `openstack`)
    pub provider_type: &'static str,
    pub default_machine_type: String,
    pub region: String,
    pub purpose: String,
    pub volume_size_gb: i32,
    pub disk_type: String,
}

/// Defaults for the plan of the request
pub fn values_for(parameters: &ProvisioningParameters, config: &Config) -> Result<Values, ProviderError> {
    let requested_region = parameters
        .parameters
        .region
        .as_deref()
        .filter(|r| !r.is_empty());
    let zones_count = if config.multi_zone_cluster {
        DEFAULT_MULTI_ZONE_COUNT
    } else {
        1
    };
    let purpose = config.default_gardener_shoot_purpose.clone();

    match parameters.plan_id.as_str() {
        plans::AWS_PLAN_ID | plans::PREVIEW_PLAN_ID => {
            let region = requested_region.unwrap_or(DEFAULT_AWS_REGION);
            Ok(aws(region, zones_count, 3, 20, DEFAULT_AWS_MACHINE_TYPE, purpose))
        }
        plans::AZURE_PLAN_ID => {
            let region = requested_region.unwrap_or(DEFAULT_AZURE_REGION);
            Ok(azure(region, zones_count, 3, 20, DEFAULT_AZURE_MACHINE_TYPE, purpose))
        }
        plans::AZURE_LITE_PLAN_ID => {
            let region = requested_region.unwrap_or(DEFAULT_AZURE_REGION);
            Ok(Values {
                volume_size_gb: 50,
                disk_type: "Standard_LRS".to_string(),
                ..azure(region, 1, 2, 10, DEFAULT_AZURE_TRIAL_MACHINE_TYPE, purpose)
            })
        }
        plans::GCP_PLAN_ID => {
            let region = if parameters.platform_region == GCP_ASSURED_WORKLOADS_PLATFORM_REGION {
                DEFAULT_GCP_ASSURED_WORKLOADS_REGION
            } else {
                requested_region.unwrap_or(DEFAULT_GCP_REGION)
            };
            Ok(gcp(region, zones_count, 3, 20, DEFAULT_GCP_MACHINE_TYPE, purpose))
        }
        plans::SAP_CONVERGED_CLOUD_PLAN_ID => {
            let region = requested_region.unwrap_or(&config.default_scc_region);
            Ok(Values {
                default_auto_scaler_max: 20,
                default_auto_scaler_min: 3,
                zones_count,
                zones: zones_from_table(&SCC_ZONES, region, zones_count),
                provider_type: "openstack",
                default_machine_type: DEFAULT_SCC_MACHINE_TYPE.to_string(),
                region: region.to_string(),
                purpose,
                volume_size_gb: 0,
                disk_type: String::new(),
            })
        }
        plans::TRIAL_PLAN_ID => {
            let provider = parameters
                .parameters
                .provider
                .unwrap_or(config.default_trial_provider);
            trial(parameters, provider, "trial")
        }
        plans::FREEMIUM_PLAN_ID => {
            let provider = parameters.platform_provider.unwrap_or(CloudProvider::Unknown);
            match provider {
                CloudProvider::Aws | CloudProvider::Azure => trial(parameters, provider, "freemium"),
                other => Err(ProviderError::UnsupportedProvider {
                    plan: "freemium",
                    provider: other.to_string(),
                }),
            }
        }
        other => Err(ProviderError::UnsupportedPlan(other.to_string())),
    }
}

fn trial(parameters: &ProvisioningParameters, provider: CloudProvider, plan: &'static str) -> Result<Values, ProviderError> {
    let eu_access = is_eu_restricted_access(&parameters.platform_region);
    let evaluation = PURPOSE_EVALUATION.to_string();
    let values = match provider {
        CloudProvider::Aws => {
            let region = if eu_access {
                DEFAULT_EU_ACCESS_AWS_REGION
            } else {
                DEFAULT_AWS_TRIAL_REGION
            };
            Values {
                volume_size_gb: 50,
                ..aws(region, 1, 1, 1, DEFAULT_AWS_TRIAL_MACHINE_TYPE, evaluation)
            }
        }
        CloudProvider::Azure => {
            let region = if eu_access {
                DEFAULT_EU_ACCESS_AZURE_REGION
            } else {
                DEFAULT_AZURE_REGION
            };
            Values {
                volume_size_gb: 50,
                disk_type: "Standard_LRS".to_string(),
                ..azure(region, 1, 1, 1, DEFAULT_AZURE_TRIAL_MACHINE_TYPE, evaluation)
            }
        }
        CloudProvider::Gcp => Values {
            volume_size_gb: 30,
            ..gcp(DEFAULT_GCP_REGION, 1, 1, 1, DEFAULT_GCP_TRIAL_MACHINE_TYPE, evaluation)
        },
        other => {
            return Err(ProviderError::UnsupportedProvider {
                plan,
                provider: other.to_string(),
            });
        }
    };
    Ok(values)
}

fn aws(region: &str, zones_count: usize, min: i32, max: i32, machine_type: &str, purpose: String) -> Values {
    Values {
        default_auto_scaler_max: max,
        default_auto_scaler_min: min,
        zones_count,
        zones: zones_from_table(&AWS_ZONES, region, zones_count),
        provider_type: "aws",
        default_machine_type: machine_type.to_string(),
        region: region.to_string(),
        purpose,
        volume_size_gb: 80,
        disk_type: "gp3".to_string(),
    }
}

fn azure(region: &str, zones_count: usize, min: i32, max: i32, machine_type: &str, purpose: String) -> Values {
    Values {
        default_auto_scaler_max: max,
        default_auto_scaler_min: min,
        zones_count,
        zones: (1..=zones_count.min(3)).map(|z| z.to_string()).collect(),
        provider_type: "azure",
        default_machine_type: machine_type.to_string(),
        region: region.to_string(),
        purpose,
        volume_size_gb: 80,
        disk_type: "StandardSSD_LRS".to_string(),
    }
}

fn gcp(region: &str, zones_count: usize, min: i32, max: i32, machine_type: &str, purpose: String) -> Values {
    Values {
        default_auto_scaler_max: max,
        default_auto_scaler_min: min,
        zones_count,
        zones: ["a", "b", "c"]
            .iter()
            .take(zones_count)
            .map(|suffix| format!("{region}-{suffix}"))
            .collect(),
        provider_type: "gcp",
        default_machine_type: machine_type.to_string(),
        region: region.to_string(),
        purpose,
        volume_size_gb: 80,
        disk_type: "pd-balanced".to_string(),
    }
}

/// `<region><suffix>` zones; unknown regions get a single `a` zone
fn zones_from_table(table: &[(&str, &str)], region: &str, zones_count: usize) -> Vec<String> {
    let suffixes = table
        .iter()
        .find(|(r, _)| *r == region)
        .map_or("a", |(_, suffixes)| *suffixes);
    suffixes
        .chars()
        .take(zones_count)
        .map(|suffix| format!("{region}{suffix}"))
        .collect()
}
