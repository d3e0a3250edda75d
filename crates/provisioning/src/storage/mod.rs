//! Storage interfaces for operations and instances.
//!
//! Both stores use optimistic concurrency: an update succeeds only when the
//! record's `version` matches the stored one, and bumps it. A mismatch is
//! reported as `StorageError::Conflict`.

pub mod memory;

use crate::model::{Instance, Operation};
use thiserror::Error;

pub use memory::MemoryStorage;

/// Errors returned by storage drivers
#[derive(Debug, Error)]
pub enum StorageError {
    /// Record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Record was modified by someone else since it was read
    #[error("conflict: {0}")]
    Conflict(String),

    /// Record with the same id already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Driver failure
    #[error("storage error: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Operation records
#[async_trait::async_trait]
pub trait Operations: Send + Sync {
    async fn insert_operation(&self, operation: Operation) -> Result<(), StorageError>;

    async fn get_operation_by_id(&self, operation_id: &str) -> Result<Operation, StorageError>;

    /// Most recently created non-pending operation of any type for the instance
    async fn get_last_operation(&self, instance_id: &str) -> Result<Operation, StorageError>;

    /// Most recent deprovisioning operation for the instance
    async fn get_deprovisioning_operation_by_instance_id(
        &self,
        instance_id: &str,
    ) -> Result<Operation, StorageError>;

    /// Persist with optimistic concurrency; returns the stored record
    async fn update_operation(&self, operation: Operation) -> Result<Operation, StorageError>;
}

/// Instance records
#[async_trait::async_trait]
pub trait Instances: Send + Sync {
    async fn insert(&self, instance: Instance) -> Result<(), StorageError>;

    async fn get_by_id(&self, instance_id: &str) -> Result<Instance, StorageError>;

    /// Persist with optimistic concurrency; returns the stored record
    async fn update(&self, instance: Instance) -> Result<Instance, StorageError>;
}
