//! In-memory storage driver
//!
//! Used by tests and by hosts that run the engine without a database.

use super::{Instances, Operations, StorageError};
use crate::model::{Instance, Operation, OperationState, OperationType};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-memory operations and instances
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    operations: Arc<Mutex<HashMap<String, Operation>>>,
    instances: Arc<Mutex<HashMap<String, Instance>>>,
    injected_instance_conflicts: Arc<AtomicUsize>,
    injected_operation_conflicts: Arc<AtomicUsize>,
    injected_operation_errors: Arc<AtomicUsize>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn take_injected(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` instance updates fail with a conflict
    pub fn inject_instance_conflicts(&self, n: usize) {
        self.injected_instance_conflicts.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` operation updates fail with a conflict
    pub fn inject_operation_conflicts(&self, n: usize) {
        self.injected_operation_conflicts.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` operation updates fail with a driver error
    pub fn inject_operation_errors(&self, n: usize) {
        self.injected_operation_errors.store(n, Ordering::SeqCst);
    }

    /// Operations stored for an instance, oldest first
    pub fn operations_for_instance(&self, instance_id: &str) -> Vec<Operation> {
        let mut ops: Vec<Operation> = lock(&self.operations)
            .values()
            .filter(|op| op.instance_id == instance_id)
            .cloned()
            .collect();
        ops.sort_by_key(|op| op.created_at);
        ops
    }
}

#[async_trait::async_trait]
impl Operations for MemoryStorage {
    async fn insert_operation(&self, operation: Operation) -> Result<(), StorageError> {
        let mut ops = lock(&self.operations);
        if ops.contains_key(&operation.id) {
            return Err(StorageError::AlreadyExists(format!("operation {}", operation.id)));
        }
        ops.insert(operation.id.clone(), operation);
        Ok(())
    }

    async fn get_operation_by_id(&self, operation_id: &str) -> Result<Operation, StorageError> {
        lock(&self.operations)
            .get(operation_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("operation {operation_id}")))
    }

    async fn get_last_operation(&self, instance_id: &str) -> Result<Operation, StorageError> {
        lock(&self.operations)
            .values()
            .filter(|op| op.instance_id == instance_id && op.state != OperationState::Pending)
            .max_by_key(|op| op.created_at)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("last operation for instance {instance_id}")))
    }

    async fn get_deprovisioning_operation_by_instance_id(
        &self,
        instance_id: &str,
    ) -> Result<Operation, StorageError> {
        lock(&self.operations)
            .values()
            .filter(|op| {
                op.instance_id == instance_id && op.operation_type == OperationType::Deprovision
            })
            .max_by_key(|op| op.created_at)
            .cloned()
            .ok_or_else(|| {
                StorageError::NotFound(format!("deprovisioning operation for instance {instance_id}"))
            })
    }

    async fn update_operation(&self, mut operation: Operation) -> Result<Operation, StorageError> {
        if take_injected(&self.injected_operation_conflicts) {
            return Err(StorageError::Conflict(format!("operation {}", operation.id)));
        }
        if take_injected(&self.injected_operation_errors) {
            return Err(StorageError::Internal(format!("operation {}: connection lost", operation.id)));
        }
        let mut ops = lock(&self.operations);
        let stored = ops
            .get(&operation.id)
            .ok_or_else(|| StorageError::NotFound(format!("operation {}", operation.id)))?;
        if stored.version != operation.version {
            return Err(StorageError::Conflict(format!(
                "operation {} has version {}, got {}",
                operation.id, stored.version, operation.version
            )));
        }
        operation.version += 1;
        operation.updated_at = Utc::now();
        ops.insert(operation.id.clone(), operation.clone());
        Ok(operation)
    }
}

#[async_trait::async_trait]
impl Instances for MemoryStorage {
    async fn insert(&self, instance: Instance) -> Result<(), StorageError> {
        let mut instances = lock(&self.instances);
        if instances.contains_key(&instance.instance_id) {
            return Err(StorageError::AlreadyExists(format!("instance {}", instance.instance_id)));
        }
        instances.insert(instance.instance_id.clone(), instance);
        Ok(())
    }

    async fn get_by_id(&self, instance_id: &str) -> Result<Instance, StorageError> {
        lock(&self.instances)
            .get(instance_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("instance {instance_id}")))
    }

    async fn update(&self, mut instance: Instance) -> Result<Instance, StorageError> {
        if take_injected(&self.injected_instance_conflicts) {
            return Err(StorageError::Conflict(format!("instance {}", instance.instance_id)));
        }
        let mut instances = lock(&self.instances);
        let stored = instances
            .get(&instance.instance_id)
            .ok_or_else(|| StorageError::NotFound(format!("instance {}", instance.instance_id)))?;
        if stored.version != instance.version {
            return Err(StorageError::Conflict(format!(
                "instance {} has version {}, got {}",
                instance.instance_id, stored.version, instance.version
            )));
        }
        instance.version += 1;
        instance.updated_at = Utc::now();
        instances.insert(instance.instance_id.clone(), instance.clone());
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProvisioningParameters;

    #[tokio::test]
    async fn test_update_operation_bumps_version() {
        let storage = MemoryStorage::new();
        let op = Operation::new_provisioning("op-1", "inst-1", ProvisioningParameters::default());
        storage.insert_operation(op.clone()).await.unwrap();

        let updated = storage.update_operation(op.clone()).await.unwrap();
        assert_eq!(updated.version, 1);

        // stale snapshot is rejected
        let err = storage.update_operation(op).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_last_operation_skips_pending() {
        let storage = MemoryStorage::new();
        let mut old = Operation::new_provisioning("op-1", "inst-1", ProvisioningParameters::default());
        old.state = OperationState::Succeeded;
        old.created_at = Utc::now() - chrono::Duration::hours(1);
        storage.insert_operation(old).await.unwrap();
        storage
            .insert_operation(Operation::new_provisioning("op-2", "inst-1", ProvisioningParameters::default()))
            .await
            .unwrap();

        let last = storage.get_last_operation("inst-1").await.unwrap();
        assert_eq!(last.id, "op-1");
        assert!(storage.get_last_operation("inst-2").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_injected_instance_conflicts() {
        let storage = MemoryStorage::new();
        let instance = Instance::from_parameters("inst-1", ProvisioningParameters::default());
        Instances::insert(&storage, instance.clone()).await.unwrap();

        storage.inject_instance_conflicts(1);
        assert!(storage.update(instance.clone()).await.unwrap_err().is_conflict());
        assert_eq!(storage.update(instance).await.unwrap().version, 1);
    }
}
