//! Runtime Provisioner GraphQL Client
//!
//! A Rust client for the legacy runtime provisioner. Only the calls the
//! provisioning engine needs are exposed: provisioning a runtime and polling
//! operation and runtime status.
//!
//! # Example
//!
//! ```no_run
//! use provisioner_client::{ProvisionerClient, ProvisionerClientTrait, OperationState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ProvisionerClient::new("http://provisioner:3000/graphql".to_string())?;
//!
//! let status = client.runtime_operation_status("global-account-id", "operation-id").await?;
//! if status.state == OperationState::Succeeded {
//!     let runtime = client.runtime_status("global-account-id", "runtime-id").await?;
//!     println!("kubeconfig present: {}", runtime.kubeconfig().is_some());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! GraphQL errors keep their `extensions` map, so `error_reason`,
//! `error_component` and `error_step` reported by the provisioner can be
//! attributed to the failing operation by the caller.

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod provisioner_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::ProvisionerClient;
pub use common::GraphQlHttpClient;
pub use error::{GraphQlError, ProvisionerError};
pub use models::*;
pub use provisioner_trait::ProvisionerClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockProvisionerClient;
