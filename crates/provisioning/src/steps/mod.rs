//! Provisioning steps
//!
//! One module per step, in pipeline order:
//!
//! | Step                              | Stage                  |
//! |-----------------------------------|------------------------|
//! | `Starting`                        | `start`                |
//! | `Provision_Initialization`        | `create_runtime`       |
//! | `Init_Kyma_Template`              | `create_runtime`       |
//! | `Generate_Runtime_ID`             | `create_runtime`       |
//! | `Create_Resource_Names`           | `create_runtime`       |
//! | `Override_Kyma_Modules`           | `create_runtime`       |
//! | `Resolve_Target_Secret`           | `create_runtime`       |
//! | `Create_Runtime_Without_Kyma`     | `create_runtime`       |
//! | `Create_Runtime_Resource`         | `create_runtime`       |
//! | `Check_Runtime`                   | `create_runtime`       |
//! | `Check_RuntimeResource`           | `create_runtime`       |
//! | `Get_Kubeconfig`                  | `create_runtime`       |
//! | `Sync_Kubeconfig`                 | `create_runtime`       |
//! | `Inject_BTP_Operator_Credentials` | `create_runtime`       |
//! | `Apply_Kyma`                      | `create_kyma_resource` |
//!
//! Helper modules ([`conditions`], [`kyma_template`], [`labels`], [`shoot`])
//! hold what more than one step needs.

pub mod apply_kyma;
#[cfg(test)]
mod apply_kyma_test;
pub mod check_runtime;
pub mod check_runtime_resource;
#[cfg(test)]
mod check_runtime_resource_test;
pub mod conditions;
pub mod create_resource_names;
pub mod create_runtime_resource;
pub mod create_runtime_without_kyma;
pub mod generate_runtime_id;
#[cfg(test)]
mod generate_runtime_id_test;
pub mod get_kubeconfig;
pub mod init_kyma_template;
pub mod initialisation;
#[cfg(test)]
mod initialisation_test;
pub mod inject_btp_operator_credentials;
pub mod kyma_template;
pub mod labels;
pub mod override_kyma_modules;
pub mod resolve_credentials;
pub mod shoot;
pub mod start;
#[cfg(test)]
mod start_test;
pub mod sync_kubeconfig;

pub use apply_kyma::ApplyKymaStep;
pub use check_runtime::CheckRuntimeStep;
pub use check_runtime_resource::CheckRuntimeResourceStep;
pub use create_resource_names::CreateResourceNamesStep;
pub use create_runtime_resource::CreateRuntimeResourceStep;
pub use create_runtime_without_kyma::CreateRuntimeWithoutKymaStep;
pub use generate_runtime_id::GenerateRuntimeIdStep;
pub use get_kubeconfig::GetKubeconfigStep;
pub use init_kyma_template::InitKymaTemplateStep;
pub use initialisation::InitialisationStep;
pub use inject_btp_operator_credentials::InjectBtpOperatorCredentialsStep;
pub use override_kyma_modules::OverrideKymaModulesStep;
pub use resolve_credentials::ResolveCredentialsStep;
pub use start::StartStep;
pub use sync_kubeconfig::SyncKubeconfigStep;

/// `anyhow` errors as a cause for `OperationManager`
pub(crate) fn cause(err: &anyhow::Error) -> &(dyn std::error::Error + Send + Sync + 'static) {
    &**err
}
