//! `kube` backed implementations

use super::{ControlPlaneClient, ControlPlaneError, KubeconfigConnector, RuntimeClientProvider, name_of, namespace_of};
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::{Api, DynamicObject, ObjectMeta, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use std::sync::Arc;
use tracing::{debug, info};

/// Default namespace holding runtime kubeconfig secrets on the control plane
pub const KUBECONFIG_SECRET_NAMESPACE: &str = "kcp-system";
/// Key of the kubeconfig inside the secret
pub const KUBECONFIG_SECRET_KEY: &str = "config";

/// Name of the secret holding a runtime's kubeconfig
pub fn kubeconfig_secret_name(runtime_id: &str) -> String {
    format!("kubeconfig-{runtime_id}")
}

/// Ring is the only provider compiled in; a second install is a no-op
fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Control-plane client backed by `kube::Client`
#[derive(Clone)]
pub struct KubeControlPlaneClient {
    client: Client,
}

impl std::fmt::Debug for KubeControlPlaneClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeControlPlaneClient").finish_non_exhaustive()
    }
}

impl KubeControlPlaneClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client for the cluster the process runs in (or `KUBECONFIG`)
    pub async fn try_default() -> Result<Self, ControlPlaneError> {
        install_crypto_provider();
        Ok(Self::new(Client::try_default().await?))
    }

    /// Client for the cluster described by a kubeconfig document
    pub async fn from_kubeconfig(kubeconfig: &str) -> Result<Self, ControlPlaneError> {
        install_crypto_provider();
        let kubeconfig: Kubeconfig = serde_yaml::from_str(kubeconfig)
            .map_err(|e| ControlPlaneError::Kubeconfig(format!("invalid kubeconfig YAML: {e}")))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| ControlPlaneError::Kubeconfig(format!("failed to build config: {e}")))?;
        let client = Client::try_from(config)?;
        Ok(Self::new(client))
    }

    fn dynamic(&self, resource: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn secret_namespace(secret: &Secret) -> Result<&str, ControlPlaneError> {
    secret
        .metadata
        .namespace
        .as_deref()
        .ok_or_else(|| ControlPlaneError::UnexpectedObject("secret has no namespace".to_string()))
}

fn secret_name(secret: &Secret) -> Result<&str, ControlPlaneError> {
    secret
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ControlPlaneError::UnexpectedObject("secret has no name".to_string()))
}

#[async_trait::async_trait]
impl ControlPlaneClient for KubeControlPlaneClient {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, ControlPlaneError> {
        debug!("GET {} {}/{}", resource.kind, namespace, name);
        Ok(self.dynamic(resource, namespace).get(name).await?)
    }

    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ControlPlaneError> {
        let namespace = namespace_of(object)?;
        debug!("CREATE {} {}/{}", resource.kind, namespace, object.metadata.name.as_deref().unwrap_or_default());
        Ok(self
            .dynamic(resource, namespace)
            .create(&PostParams::default(), object)
            .await?)
    }

    async fn update(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ControlPlaneError> {
        let namespace = namespace_of(object)?;
        let name = name_of(object)?;
        debug!("UPDATE {} {}/{}", resource.kind, namespace, name);
        Ok(self
            .dynamic(resource, namespace)
            .replace(name, &PostParams::default(), object)
            .await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ControlPlaneError> {
        Ok(self.secrets(namespace).get(name).await?)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, ControlPlaneError> {
        let namespace = secret_namespace(secret)?;
        Ok(self.secrets(namespace).create(&PostParams::default(), secret).await?)
    }

    async fn update_secret(&self, secret: &Secret) -> Result<Secret, ControlPlaneError> {
        let namespace = secret_namespace(secret)?;
        let name = secret_name(secret)?;
        Ok(self
            .secrets(namespace)
            .replace(name, &PostParams::default(), secret)
            .await?)
    }

    async fn ensure_namespace(&self, name: &str) -> Result<(), ControlPlaneError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.get(name).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                let namespace = Namespace {
                    metadata: ObjectMeta {
                        name: Some(name.to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                match api.create(&PostParams::default(), &namespace).await {
                    Ok(_) => {
                        info!("Created namespace {}", name);
                        Ok(())
                    }
                    Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Connects with `kube` to the cluster a kubeconfig points at
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeConnector;

#[async_trait::async_trait]
impl KubeconfigConnector for KubeConnector {
    async fn connect(&self, kubeconfig: &str) -> Result<Arc<dyn ControlPlaneClient>, ControlPlaneError> {
        Ok(Arc::new(KubeControlPlaneClient::from_kubeconfig(kubeconfig).await?))
    }
}

/// Builds runtime clients from the `kubeconfig-<runtime_id>` secrets on the control plane
///
/// The secrets are written by the `Sync_Kubeconfig` step, or by the
/// infrastructure manager for runtimes it provisions alone.
#[derive(Clone)]
pub struct KubeconfigSecretClientProvider {
    control_plane: Arc<dyn ControlPlaneClient>,
    namespace: String,
    connector: Arc<dyn KubeconfigConnector>,
}

impl std::fmt::Debug for KubeconfigSecretClientProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeconfigSecretClientProvider")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KubeconfigSecretClientProvider {
    pub fn new(control_plane: Arc<dyn ControlPlaneClient>) -> Self {
        Self {
            control_plane,
            namespace: KUBECONFIG_SECRET_NAMESPACE.to_string(),
            connector: Arc::new(KubeConnector),
        }
    }

    /// Read the secrets from another namespace; it must match the Kyma resource namespace
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn KubeconfigConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Kubeconfig stored for a runtime
    pub async fn kubeconfig(&self, runtime_id: &str) -> Result<String, ControlPlaneError> {
        let name = kubeconfig_secret_name(runtime_id);
        let secret = self.control_plane.get_secret(&self.namespace, &name).await?;
        kubeconfig_from_secret(&secret)
            .ok_or_else(|| ControlPlaneError::Kubeconfig(format!("secret {name} has no {KUBECONFIG_SECRET_KEY} key")))
    }
}

/// Extract the kubeconfig document from a kubeconfig secret
pub fn kubeconfig_from_secret(secret: &Secret) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(KUBECONFIG_SECRET_KEY))
        .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
        .filter(|s| !s.is_empty())
}

#[async_trait::async_trait]
impl RuntimeClientProvider for KubeconfigSecretClientProvider {
    async fn client_for(&self, runtime_id: &str) -> Result<Arc<dyn ControlPlaneClient>, ControlPlaneError> {
        let kubeconfig = self.kubeconfig(runtime_id).await?;
        debug!("Connecting to runtime {}", runtime_id);
        self.connector.connect(&kubeconfig).await
    }
}
