//! Control-plane Kubernetes access
//!
//! Steps talk to Kubernetes only through [`ControlPlaneClient`], which works on
//! untyped `DynamicObject`s identified by an `ApiResource` plus the handful of
//! typed Secret and Namespace calls credential injection needs. The concrete
//! [`KubeControlPlaneClient`] wraps `kube::Client`; tests use
//! [`MockControlPlaneClient`].

pub mod client;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use k8s_openapi::api::core::v1::Secret;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use std::sync::Arc;
use thiserror::Error;

pub use client::{KubeConnector, KubeControlPlaneClient, KubeconfigSecretClientProvider};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockControlPlaneClient, MockKubeconfigConnector, MockRuntimeClientProvider};

/// Errors from the control-plane or runtime Kubernetes API
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// Status error returned by the API server
    #[error("{message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Machine readable reason (`NotFound`, `AlreadyExists`, ...)
        reason: String,
        message: String,
    },

    /// Object could not be decoded into the expected shape
    #[error("unexpected object: {0}")]
    UnexpectedObject(String),

    /// No resource registered for the requested kind
    #[error("no matches for kind: {0}")]
    NoMatch(String),

    /// More than one resource matches the requested kind
    #[error("ambiguous kind: {0}")]
    Ambiguous(String),

    /// Kubeconfig missing or unusable
    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(String),

    /// Transport or client-side failure
    #[error("kubernetes client error: {0}")]
    Client(#[source] kube::Error),
}

impl ControlPlaneError {
    /// 404 status error in the shape the API server returns it
    pub fn not_found(resource: &str, name: &str) -> Self {
        Self::Api {
            code: 404,
            reason: "NotFound".to_string(),
            message: format!("{resource} \"{name}\" not found"),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { code: 404, .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Api { code: 409, reason, .. } if reason == "AlreadyExists")
    }
}

impl From<kube::Error> for ControlPlaneError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => Self::Api {
                code: ae.code,
                reason: ae.reason.clone(),
                message: ae.message.clone(),
            },
            other => Self::Client(other),
        }
    }
}

/// Operations the engine performs against a Kubernetes API
#[async_trait::async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// Fetch an object, `Api` 404 when it does not exist
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, ControlPlaneError>;

    /// Create an object in `metadata.namespace`
    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ControlPlaneError>;

    /// Replace an existing object
    async fn update(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ControlPlaneError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ControlPlaneError>;

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, ControlPlaneError>;

    async fn update_secret(&self, secret: &Secret) -> Result<Secret, ControlPlaneError>;

    /// Create the namespace unless it already exists
    async fn ensure_namespace(&self, name: &str) -> Result<(), ControlPlaneError>;
}

/// Builds clients for provisioned runtimes
#[async_trait::async_trait]
pub trait RuntimeClientProvider: Send + Sync {
    async fn client_for(&self, runtime_id: &str) -> Result<Arc<dyn ControlPlaneClient>, ControlPlaneError>;
}

/// Opens a client for the cluster a kubeconfig document describes
#[async_trait::async_trait]
pub trait KubeconfigConnector: Send + Sync {
    async fn connect(&self, kubeconfig: &str) -> Result<Arc<dyn ControlPlaneClient>, ControlPlaneError>;
}

/// Namespace of an object, required for namespaced calls
pub(crate) fn namespace_of(object: &DynamicObject) -> Result<&str, ControlPlaneError> {
    object
        .metadata
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .ok_or_else(|| ControlPlaneError::UnexpectedObject("object has no namespace".to_string()))
}

/// Name of an object, required for get and replace
pub(crate) fn name_of(object: &DynamicObject) -> Result<&str, ControlPlaneError> {
    object
        .metadata
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ControlPlaneError::UnexpectedObject("object has no name".to_string()))
}
