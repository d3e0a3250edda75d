//! Kyma CRD Definitions
//!
//! Resource types the provisioning engine writes to the control-plane cluster:
//! - `Runtime`: desired cluster description consumed by the infrastructure manager
//! - `Kyma`: platform installation resource, handled as an unstructured object

pub mod kyma;
pub mod runtime;

pub use kyma::*;
pub use runtime::*;
