//! In-memory Kubernetes API for unit tests
//!
//! Mimics the API server closely enough for create-or-update logic: create
//! fails with `AlreadyExists`, get and update fail with `NotFound`, and every
//! write bumps `metadata.resourceVersion`.

use super::{ControlPlaneClient, ControlPlaneError, KubeconfigConnector, RuntimeClientProvider, name_of, namespace_of};
use k8s_openapi::api::core::v1::Secret;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type ObjectKey = (String, String, String);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn key(resource: &ApiResource, namespace: &str, name: &str) -> ObjectKey {
    (resource.plural.clone(), namespace.to_string(), name.to_string())
}

fn bump_resource_version(current: Option<&str>) -> String {
    let version: u64 = current.and_then(|v| v.parse().ok()).unwrap_or(0);
    (version + 1).to_string()
}

/// Mock control-plane client
#[derive(Debug, Clone, Default)]
pub struct MockControlPlaneClient {
    objects: Arc<Mutex<HashMap<ObjectKey, DynamicObject>>>,
    secrets: Arc<Mutex<HashMap<(String, String), Secret>>>,
    namespaces: Arc<Mutex<BTreeSet<String>>>,
    failure: Arc<Mutex<Option<(u16, String)>>>,
    writes: Arc<Mutex<Vec<String>>>,
}

impl MockControlPlaneClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object (for test setup)
    pub fn insert_object(&self, resource: &ApiResource, object: DynamicObject) {
        let namespace = object.metadata.namespace.clone().unwrap_or_default();
        let name = object.metadata.name.clone().unwrap_or_default();
        lock(&self.objects).insert(key(resource, &namespace, &name), object);
    }

    /// Stored object, if any
    pub fn object(&self, resource: &ApiResource, namespace: &str, name: &str) -> Option<DynamicObject> {
        lock(&self.objects).get(&key(resource, namespace, name)).cloned()
    }

    /// All stored objects of a kind
    pub fn objects(&self, resource: &ApiResource) -> Vec<DynamicObject> {
        lock(&self.objects)
            .iter()
            .filter(|((plural, _, _), _)| *plural == resource.plural)
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    /// Seed a secret (for test setup)
    pub fn insert_secret(&self, secret: Secret) {
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();
        let name = secret.metadata.name.clone().unwrap_or_default();
        lock(&self.secrets).insert((namespace, name), secret);
    }

    /// Stored secret, if any
    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        lock(&self.secrets)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        lock(&self.namespaces).contains(name)
    }

    /// Fail every call with an API status error until cleared
    pub fn fail_with(&self, code: u16, reason: &str) {
        *lock(&self.failure) = Some((code, reason.to_string()));
    }

    pub fn clear_failure(&self) {
        *lock(&self.failure) = None;
    }

    /// Write calls made so far, as `VERB kind/namespace/name`
    pub fn writes(&self) -> Vec<String> {
        lock(&self.writes).clone()
    }

    fn check_failure(&self) -> Result<(), ControlPlaneError> {
        match lock(&self.failure).as_ref() {
            Some((code, reason)) => Err(ControlPlaneError::Api {
                code: *code,
                reason: reason.clone(),
                message: format!("injected failure: {reason}"),
            }),
            None => Ok(()),
        }
    }

    fn record(&self, verb: &str, kind: &str, namespace: &str, name: &str) {
        lock(&self.writes).push(format!("{verb} {kind}/{namespace}/{name}"));
    }
}

#[async_trait::async_trait]
impl ControlPlaneClient for MockControlPlaneClient {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, ControlPlaneError> {
        self.check_failure()?;
        self.object(resource, namespace, name)
            .ok_or_else(|| ControlPlaneError::not_found(&resource.plural, name))
    }

    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ControlPlaneError> {
        self.check_failure()?;
        let namespace = namespace_of(object)?;
        let name = name_of(object)?;
        let mut objects = lock(&self.objects);
        let k = key(resource, namespace, name);
        if objects.contains_key(&k) {
            return Err(ControlPlaneError::Api {
                code: 409,
                reason: "AlreadyExists".to_string(),
                message: format!("{} \"{}\" already exists", resource.plural, name),
            });
        }
        let mut stored = object.clone();
        stored.metadata.resource_version = Some(bump_resource_version(None));
        objects.insert(k, stored.clone());
        self.record("CREATE", &resource.kind, namespace, name);
        Ok(stored)
    }

    async fn update(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ControlPlaneError> {
        self.check_failure()?;
        let namespace = namespace_of(object)?;
        let name = name_of(object)?;
        let mut objects = lock(&self.objects);
        let k = key(resource, namespace, name);
        let current = objects
            .get(&k)
            .ok_or_else(|| ControlPlaneError::not_found(&resource.plural, name))?;
        let mut stored = object.clone();
        stored.metadata.resource_version =
            Some(bump_resource_version(current.metadata.resource_version.as_deref()));
        objects.insert(k, stored.clone());
        self.record("UPDATE", &resource.kind, namespace, name);
        Ok(stored)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ControlPlaneError> {
        self.check_failure()?;
        self.secret(namespace, name)
            .ok_or_else(|| ControlPlaneError::not_found("secrets", name))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, ControlPlaneError> {
        self.check_failure()?;
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();
        let name = secret.metadata.name.clone().unwrap_or_default();
        if !self.has_namespace(&namespace) {
            return Err(ControlPlaneError::not_found("namespaces", &namespace));
        }
        let mut secrets = lock(&self.secrets);
        let k = (namespace.clone(), name.clone());
        if secrets.contains_key(&k) {
            return Err(ControlPlaneError::Api {
                code: 409,
                reason: "AlreadyExists".to_string(),
                message: format!("secrets \"{name}\" already exists"),
            });
        }
        secrets.insert(k, secret.clone());
        self.record("CREATE", "Secret", &namespace, &name);
        Ok(secret.clone())
    }

    async fn update_secret(&self, secret: &Secret) -> Result<Secret, ControlPlaneError> {
        self.check_failure()?;
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();
        let name = secret.metadata.name.clone().unwrap_or_default();
        let mut secrets = lock(&self.secrets);
        let k = (namespace.clone(), name.clone());
        if !secrets.contains_key(&k) {
            return Err(ControlPlaneError::not_found("secrets", &name));
        }
        secrets.insert(k, secret.clone());
        self.record("UPDATE", "Secret", &namespace, &name);
        Ok(secret.clone())
    }

    async fn ensure_namespace(&self, name: &str) -> Result<(), ControlPlaneError> {
        self.check_failure()?;
        lock(&self.namespaces).insert(name.to_string());
        Ok(())
    }
}

/// Hands out pre-registered clients per runtime id
#[derive(Debug, Clone, Default)]
pub struct MockRuntimeClientProvider {
    clients: Arc<Mutex<HashMap<String, MockControlPlaneClient>>>,
}

impl MockRuntimeClientProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runtime cluster; returns the mock backing it
    pub fn register(&self, runtime_id: &str) -> MockControlPlaneClient {
        let client = MockControlPlaneClient::new();
        lock(&self.clients).insert(runtime_id.to_string(), client.clone());
        client
    }
}

#[async_trait::async_trait]
impl RuntimeClientProvider for MockRuntimeClientProvider {
    async fn client_for(&self, runtime_id: &str) -> Result<Arc<dyn ControlPlaneClient>, ControlPlaneError> {
        lock(&self.clients)
            .get(runtime_id)
            .cloned()
            .map(|c| Arc::new(c) as Arc<dyn ControlPlaneClient>)
            .ok_or_else(|| ControlPlaneError::not_found("secrets", &format!("kubeconfig-{runtime_id}")))
    }
}

/// Hands out pre-registered clients per kubeconfig document
#[derive(Debug, Clone, Default)]
pub struct MockKubeconfigConnector {
    clients: Arc<Mutex<HashMap<String, MockControlPlaneClient>>>,
}

impl MockKubeconfigConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the cluster a kubeconfig leads to; returns the mock backing it
    pub fn register(&self, kubeconfig: &str) -> MockControlPlaneClient {
        let client = MockControlPlaneClient::new();
        lock(&self.clients).insert(kubeconfig.to_string(), client.clone());
        client
    }
}

#[async_trait::async_trait]
impl KubeconfigConnector for MockKubeconfigConnector {
    async fn connect(&self, kubeconfig: &str) -> Result<Arc<dyn ControlPlaneClient>, ControlPlaneError> {
        lock(&self.clients)
            .get(kubeconfig)
            .cloned()
            .map(|c| Arc::new(c) as Arc<dyn ControlPlaneClient>)
            .ok_or_else(|| ControlPlaneError::Kubeconfig("no cluster behind this kubeconfig".to_string()))
    }
}
