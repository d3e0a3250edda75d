//! Hyperscaler account pool lookup
//!
//! Secret bindings live in pools keyed by hyperscaler type. Trial and
//! SAP Converged Cloud runtimes share bindings; everything else gets a binding
//! dedicated to the global account.

use crate::model::CloudProvider;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Platform region in Dammam, served from a dedicated GCP pool
const GCP_DAMMAM_PLATFORM_REGION: &str = "cf-sa30";

/// Platform regions restricted to EU access
const EU_RESTRICTED_PLATFORM_REGIONS: [&str; 2] = ["cf-eu11", "cf-ch20"];

/// Account pool errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccountPoolError {
    /// Cloud provider has no hyperscaler pool
    #[error("cannot determine the type of hyperscaler to use for cloud provider {0}")]
    UnknownProvider(String),

    /// Every binding in the pool is taken
    #[error("no free secret binding for hyperscaler {0}")]
    NoFreeBinding(String),

    /// Pool backend could not be reached
    #[error("account pool unavailable: {0}")]
    Unavailable(String),
}

/// Hyperscaler the secret binding must belong to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HyperscalerType {
    Azure,
    Aws,
    /// GCP, keyed by platform region
    Gcp(String),
    /// SAP Converged Cloud, keyed by hyperscaler region
    Openstack(String),
}

impl HyperscalerType {
    /// Hyperscaler for a cloud provider
    pub fn from_cloud_provider(
        provider: CloudProvider,
        region: &str,
        platform_region: &str,
    ) -> Result<Self, AccountPoolError> {
        match provider {
            CloudProvider::Azure => Ok(Self::Azure),
            CloudProvider::Aws => Ok(Self::Aws),
            CloudProvider::Gcp => Ok(Self::Gcp(platform_region.to_string())),
            CloudProvider::SapConvergedCloud => Ok(Self::Openstack(region.to_string())),
            CloudProvider::Unknown => Err(AccountPoolError::UnknownProvider(provider.to_string())),
        }
    }

    /// Gardener provider name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Azure => "azure",
            Self::Aws => "aws",
            Self::Gcp(_) => "gcp",
            Self::Openstack(_) => "openstack",
        }
    }

    /// Pool key used for secret binding lookup
    pub fn key(&self) -> String {
        match self {
            Self::Gcp(platform_region) if platform_region == GCP_DAMMAM_PLATFORM_REGION => {
                format!("gcp_{GCP_DAMMAM_PLATFORM_REGION}")
            }
            Self::Openstack(region) => format!("openstack_{region}"),
            other => other.name().to_string(),
        }
    }
}

impl fmt::Display for HyperscalerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Whether a platform region is restricted to EU access
pub fn is_eu_restricted_access(platform_region: &str) -> bool {
    EU_RESTRICTED_PLATFORM_REGIONS.contains(&platform_region)
}

/// Gardener secret binding pool
#[async_trait::async_trait]
pub trait AccountProvider: Send + Sync {
    /// Binding dedicated to a tenant (global account)
    async fn gardener_secret_name(
        &self,
        hyperscaler: &HyperscalerType,
        tenant_name: &str,
        eu_access: bool,
    ) -> Result<String, AccountPoolError>;

    /// Binding shared between tenants
    async fn gardener_shared_secret_name(
        &self,
        hyperscaler: &HyperscalerType,
        eu_access: bool,
    ) -> Result<String, AccountPoolError>;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deterministic in-memory pool
///
/// Hands out `sb-<key>[-euaccess]-<tenant>` and `sb-<key>[-euaccess]-shared`
/// and remembers tenant assignments.
#[derive(Debug, Clone, Default)]
pub struct FakeAccountProvider {
    assigned: Arc<Mutex<HashMap<(String, String), String>>>,
    failure: Arc<Mutex<Option<AccountPoolError>>>,
}

impl FakeAccountProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every lookup until cleared
    pub fn fail_with(&self, error: Option<AccountPoolError>) {
        *lock(&self.failure) = error;
    }

    fn check_failure(&self) -> Result<(), AccountPoolError> {
        match lock(&self.failure).as_ref() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn pool(hyperscaler: &HyperscalerType, eu_access: bool) -> String {
        if eu_access {
            format!("sb-{}-euaccess", hyperscaler.key())
        } else {
            format!("sb-{}", hyperscaler.key())
        }
    }
}

#[async_trait::async_trait]
impl AccountProvider for FakeAccountProvider {
    async fn gardener_secret_name(
        &self,
        hyperscaler: &HyperscalerType,
        tenant_name: &str,
        eu_access: bool,
    ) -> Result<String, AccountPoolError> {
        self.check_failure()?;
        let pool = Self::pool(hyperscaler, eu_access);
        let name = lock(&self.assigned)
            .entry((pool.clone(), tenant_name.to_string()))
            .or_insert_with(|| format!("{pool}-{tenant_name}"))
            .clone();
        Ok(name)
    }

    async fn gardener_shared_secret_name(
        &self,
        hyperscaler: &HyperscalerType,
        eu_access: bool,
    ) -> Result<String, AccountPoolError> {
        self.check_failure()?;
        Ok(format!("{}-shared", Self::pool(hyperscaler, eu_access)))
    }
}
