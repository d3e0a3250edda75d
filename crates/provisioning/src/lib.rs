//! Kyma Runtime Provisioning Engine
//!
//! Durable, resumable pipeline that takes a provisioning operation from
//! `Pending` to a running Kyma runtime. Every step reads an operation
//! snapshot and answers with "done", "run me again after a backoff" or
//! "failed"; progress is persisted with optimistic concurrency, so any worker
//! can pick an operation up again after a restart.
//!
//! # Example
//!
//! ```no_run
//! use provisioning_engine::{Config, Dependencies, KubeControlPlaneClient, KubeconfigSecretClientProvider};
//! use provisioning_engine::hyperscaler::FakeAccountProvider;
//! use provisioning_engine::pipeline::{new_provisioning_manager, new_provisioning_queue};
//! use provisioning_engine::storage::MemoryStorage;
//! use provisioner_client::ProvisionerClient;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let storage = MemoryStorage::new();
//! let control_plane = Arc::new(KubeControlPlaneClient::try_default().await?);
//! let deps = Dependencies {
//!     operations: Arc::new(storage.clone()),
//!     instances: Arc::new(storage),
//!     provisioner: Arc::new(ProvisionerClient::new("http://provisioner:3000/graphql".to_string())?),
//!     control_plane: control_plane.clone(),
//!     runtime_clients: Arc::new(KubeconfigSecretClientProvider::new(control_plane)),
//!     accounts: Arc::new(FakeAccountProvider::new()),
//! };
//!
//! let queue = new_provisioning_queue(new_provisioning_manager(&deps, &config)?);
//! queue.run(config.workers);
//! queue.add("operation-id");
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`process`]: step contract, operation manager, staged runner, worker queue
//! - [`steps`]: the provisioning steps and their conditions
//! - [`pipeline`]: wiring of the steps into stages
//! - [`error`]: failure taxonomy and classification
//! - [`storage`]: operation and instance stores

pub mod config;
pub mod error;
pub mod hyperscaler;
pub mod k8s;
pub mod model;
pub mod pipeline;
pub mod plans;
pub mod process;
pub mod provider;
pub mod steps;
pub mod storage;
#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

pub use config::{Config, KimConfig};
pub use error::{Component, LastError, Reason};
pub use k8s::{
    ControlPlaneClient, KubeConnector, KubeControlPlaneClient, KubeconfigConnector, KubeconfigSecretClientProvider,
    RuntimeClientProvider,
};
pub use model::{Instance, Operation, OperationState, OperationType};
pub use pipeline::Dependencies;
pub use process::{EngineError, Queue, StagedManager, Step, StepOutcome, StepResult};
