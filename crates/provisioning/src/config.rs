//! Engine configuration
//!
//! Loaded once at startup and passed explicitly to the pipeline builder.
//! Values come from `APP_`-prefixed environment variables; anything unset
//! falls back to the defaults below.

use crate::model::CloudProvider;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Kyma resource template used when the operation does not bring its own
pub const DEFAULT_KYMA_TEMPLATE: &str = r#"apiVersion: operator.kyma-project.io/v1beta2
kind: Kyma
metadata:
  name: tbd
  namespace: kyma-system
spec:
  channel: regular
  modules: []
"#;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Infrastructure manager feature matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KimConfig {
    pub enabled: bool,
    pub dry_run: bool,
    pub view_only: bool,
    pub plans: Vec<String>,
    pub kim_only_plans: Vec<String>,
}

impl Default for KimConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dry_run: true,
            view_only: true,
            plans: vec!["preview".to_string()],
            kim_only_plans: Vec::new(),
        }
    }
}

impl KimConfig {
    /// KIM is active for the plan
    pub fn is_enabled_for_plan(&self, plan_name: &str) -> bool {
        self.enabled && self.plans.iter().any(|p| p.trim() == plan_name)
    }

    /// Provisioner is bypassed entirely for the plan
    pub fn is_driven_by_kim_only(&self, plan_name: &str) -> bool {
        self.is_enabled_for_plan(plan_name) && self.kim_only_plans.iter().any(|p| p.trim() == plan_name)
    }

    /// Runtime resources are really written for the plan
    pub fn is_driven_by_kim(&self, plan_name: &str) -> bool {
        (self.is_enabled_for_plan(plan_name) && !self.view_only && !self.dry_run)
            || self.is_driven_by_kim_only(plan_name)
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub kim: KimConfig,
    /// Ceiling for the whole provisioning and for provisioner polling
    pub provisioning_timeout: Duration,
    /// Ceiling for creating the Runtime resource
    pub create_runtime_timeout: Duration,
    /// Ceiling for waiting on the Runtime resource to become ready
    pub check_runtime_resource_timeout: Duration,
    /// Backoff accumulated in-process before an operation goes back to the queue
    pub max_step_processing_time: Duration,
    pub workers: usize,
    /// Region for `sap-converged-cloud` when none is requested
    pub default_scc_region: String,
    pub kyma_template: String,
    /// Spread workers of paid plans over several zones
    pub multi_zone_cluster: bool,
    /// Gardener shoot purpose for paid plans
    pub default_gardener_shoot_purpose: String,
    /// Provider for trial runtimes that do not ask for one
    pub default_trial_provider: CloudProvider,
    pub kubernetes_version: String,
    pub machine_image: String,
    pub machine_image_version: String,
    /// `zone` or `node`
    pub control_plane_failure_tolerance: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kim: KimConfig::default(),
            provisioning_timeout: Duration::from_secs(6 * 3600),
            create_runtime_timeout: Duration::from_secs(3600),
            check_runtime_resource_timeout: Duration::from_secs(3600),
            max_step_processing_time: Duration::from_secs(120),
            workers: 20,
            default_scc_region: "eu-de-1".to_string(),
            kyma_template: DEFAULT_KYMA_TEMPLATE.to_string(),
            multi_zone_cluster: false,
            default_gardener_shoot_purpose: "production".to_string(),
            default_trial_provider: CloudProvider::Aws,
            kubernetes_version: "1.29".to_string(),
            machine_image: "gardenlinux".to_string(),
            machine_image_version: "1312.3.0".to_string(),
            control_plane_failure_tolerance: "zone".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("APP_KIM_ENABLED") {
            config.kim.enabled = parse_bool("APP_KIM_ENABLED", &v)?;
        }
        if let Some(v) = get("APP_KIM_DRY_RUN") {
            config.kim.dry_run = parse_bool("APP_KIM_DRY_RUN", &v)?;
        }
        if let Some(v) = get("APP_KIM_VIEW_ONLY") {
            config.kim.view_only = parse_bool("APP_KIM_VIEW_ONLY", &v)?;
        }
        if let Some(v) = get("APP_KIM_PLANS") {
            config.kim.plans = parse_list(&v);
        }
        if let Some(v) = get("APP_KIM_KIM_ONLY_PLANS") {
            config.kim.kim_only_plans = parse_list(&v);
        }
        if let Some(v) = get("APP_PROVISIONING_TIMEOUT") {
            config.provisioning_timeout = parse_duration("APP_PROVISIONING_TIMEOUT", &v)?;
        }
        if let Some(v) = get("APP_CREATE_RUNTIME_TIMEOUT") {
            config.create_runtime_timeout = parse_duration("APP_CREATE_RUNTIME_TIMEOUT", &v)?;
        }
        if let Some(v) = get("APP_CHECK_RUNTIME_RESOURCE_TIMEOUT") {
            config.check_runtime_resource_timeout = parse_duration("APP_CHECK_RUNTIME_RESOURCE_TIMEOUT", &v)?;
        }
        if let Some(v) = get("APP_MAX_STEP_PROCESSING_TIME") {
            config.max_step_processing_time = parse_duration("APP_MAX_STEP_PROCESSING_TIME", &v)?;
        }
        if let Some(v) = get("APP_WORKERS") {
            config.workers = v.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                key: "APP_WORKERS".to_string(),
                message: e.to_string(),
            })?;
        }
        if let Some(v) = get("APP_DEFAULT_SCC_REGION") {
            config.default_scc_region = v.trim().to_string();
        }
        if let Some(v) = get("APP_KYMA_TEMPLATE") {
            config.kyma_template = v;
        }
        if let Some(v) = get("APP_MULTI_ZONE_CLUSTER") {
            config.multi_zone_cluster = parse_bool("APP_MULTI_ZONE_CLUSTER", &v)?;
        }
        if let Some(v) = get("APP_DEFAULT_GARDENER_SHOOT_PURPOSE") {
            config.default_gardener_shoot_purpose = v.trim().to_string();
        }
        if let Some(v) = get("APP_DEFAULT_TRIAL_PROVIDER") {
            config.default_trial_provider = parse_provider("APP_DEFAULT_TRIAL_PROVIDER", &v)?;
        }
        if let Some(v) = get("APP_KUBERNETES_VERSION") {
            config.kubernetes_version = v.trim().to_string();
        }
        if let Some(v) = get("APP_MACHINE_IMAGE") {
            config.machine_image = v.trim().to_string();
        }
        if let Some(v) = get("APP_MACHINE_IMAGE_VERSION") {
            config.machine_image_version = v.trim().to_string();
        }
        if let Some(v) = get("APP_CONTROL_PLANE_FAILURE_TOLERANCE") {
            config.control_plane_failure_tolerance = v.trim().to_string();
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(ConfigError::Invalid {
            key: key.to_string(),
            message: format!("not a boolean: {other}"),
        }),
    }
}

fn parse_provider(key: &str, value: &str) -> Result<CloudProvider, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "aws" => Ok(CloudProvider::Aws),
        "azure" => Ok(CloudProvider::Azure),
        "gcp" => Ok(CloudProvider::Gcp),
        other => Err(ConfigError::Invalid {
            key: key.to_string(),
            message: format!("unsupported trial provider: {other}"),
        }),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a duration such as `500ms`, `30s`, `10m`, `6h` or `1h30m`
pub fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        key: key.to_string(),
        message,
    };

    let mut rest = value.trim();
    if rest.is_empty() {
        return Err(invalid("empty duration".to_string()));
    }

    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid(format!("expected a number in {value:?}")));
        }
        let amount: u64 = rest[..digits]
            .parse()
            .map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount * 60),
            "h" => Duration::from_secs(amount * 3600),
            "" => return Err(invalid(format!("missing unit in {value:?}"))),
            unit => return Err(invalid(format!("unknown unit {unit:?}"))),
        };
        total += part;
        rest = &rest[unit_len..];
    }

    Ok(total)
}
