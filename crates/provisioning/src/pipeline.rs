//! Provisioning pipeline assembly
//!
//! Wires every provisioning step into a [`StagedManager`] in execution order
//! and attaches the conditions that keep plan-specific steps out of the way.

use crate::config::Config;
use crate::hyperscaler::AccountProvider;
use crate::k8s::{ControlPlaneClient, RuntimeClientProvider};
use crate::process::{EngineError, Queue, StagedManager};
use crate::steps::conditions::{
    all_of, skip_for_kim_only, skip_for_own_cluster_plan, when_btp_operator_credentials_provided,
};
use crate::steps::{
    ApplyKymaStep, CheckRuntimeResourceStep, CheckRuntimeStep, CreateResourceNamesStep,
    CreateRuntimeResourceStep, CreateRuntimeWithoutKymaStep, GenerateRuntimeIdStep, GetKubeconfigStep,
    InitKymaTemplateStep, InitialisationStep, InjectBtpOperatorCredentialsStep, OverrideKymaModulesStep,
    ResolveCredentialsStep, StartStep, SyncKubeconfigStep,
};
use crate::storage::{Instances, Operations};
use provisioner_client::ProvisionerClientTrait;
use std::sync::Arc;
use tracing::info;

pub const START_STAGE: &str = "start";
pub const CREATE_RUNTIME_STAGE: &str = "create_runtime";
pub const CREATE_KYMA_RESOURCE_STAGE: &str = "create_kyma_resource";

/// Name of the provisioning worker queue
pub const PROVISIONING_QUEUE: &str = "provisioning";

/// External collaborators of the provisioning steps
#[derive(Clone)]
pub struct Dependencies {
    pub operations: Arc<dyn Operations>,
    pub instances: Arc<dyn Instances>,
    pub provisioner: Arc<dyn ProvisionerClientTrait>,
    /// Client for the control-plane cluster holding Kyma and Runtime resources
    pub control_plane: Arc<dyn ControlPlaneClient>,
    /// Clients for the provisioned clusters, usually reading the secrets `Sync_Kubeconfig` writes
    pub runtime_clients: Arc<dyn RuntimeClientProvider>,
    pub accounts: Arc<dyn AccountProvider>,
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies").finish_non_exhaustive()
    }
}

/// Staged manager running the full provisioning pipeline
///
/// # Errors
///
/// Only when a step is registered for an undefined stage, which would be a
/// wiring mistake in this function.
pub fn new_provisioning_manager(deps: &Dependencies, config: &Config) -> Result<StagedManager, EngineError> {
    let operations = &deps.operations;
    let mut manager = StagedManager::new(
        Arc::clone(operations),
        config.provisioning_timeout,
        config.max_step_processing_time,
    );
    manager.define_stages([START_STAGE, CREATE_RUNTIME_STAGE, CREATE_KYMA_RESOURCE_STAGE]);

    manager.add_step(
        START_STAGE,
        Arc::new(StartStep::new(Arc::clone(operations), Arc::clone(&deps.instances))),
        None,
    )?;

    let stage = CREATE_RUNTIME_STAGE;
    manager.add_step(
        stage,
        Arc::new(InitialisationStep::new(Arc::clone(operations), Arc::clone(&deps.instances))),
        None,
    )?;
    manager.add_step(
        stage,
        Arc::new(InitKymaTemplateStep::new(Arc::clone(operations), config.kyma_template.clone())),
        None,
    )?;
    manager.add_step(
        stage,
        Arc::new(GenerateRuntimeIdStep::new(Arc::clone(operations), Arc::clone(&deps.instances))),
        None,
    )?;
    manager.add_step(stage, Arc::new(CreateResourceNamesStep::new(Arc::clone(operations))), None)?;
    manager.add_step(stage, Arc::new(OverrideKymaModulesStep::new(Arc::clone(operations))), None)?;
    manager.add_step(
        stage,
        Arc::new(ResolveCredentialsStep::new(
            Arc::clone(operations),
            Arc::clone(&deps.accounts),
            config.default_scc_region.clone(),
        )),
        Some(skip_for_own_cluster_plan()),
    )?;
    manager.add_step(
        stage,
        Arc::new(CreateRuntimeWithoutKymaStep::new(
            Arc::clone(operations),
            Arc::clone(&deps.provisioner),
            config.clone(),
        )),
        Some(all_of(vec![
            skip_for_own_cluster_plan(),
            skip_for_kim_only(config.kim.clone()),
        ])),
    )?;
    manager.add_step(
        stage,
        Arc::new(CreateRuntimeResourceStep::new(
            Arc::clone(operations),
            Arc::clone(&deps.control_plane),
            config.clone(),
        )),
        Some(skip_for_own_cluster_plan()),
    )?;
    manager.add_step(
        stage,
        Arc::new(CheckRuntimeStep::new(
            Arc::clone(operations),
            Arc::clone(&deps.provisioner),
            config.clone(),
        )),
        Some(skip_for_own_cluster_plan()),
    )?;
    manager.add_step(
        stage,
        Arc::new(CheckRuntimeResourceStep::new(
            Arc::clone(operations),
            Arc::clone(&deps.control_plane),
            config.clone(),
        )),
        Some(skip_for_own_cluster_plan()),
    )?;
    manager.add_step(
        stage,
        Arc::new(GetKubeconfigStep::new(
            Arc::clone(operations),
            Arc::clone(&deps.provisioner),
            config.clone(),
        )),
        None,
    )?;
    manager.add_step(
        stage,
        Arc::new(SyncKubeconfigStep::new(Arc::clone(operations), Arc::clone(&deps.control_plane))),
        None,
    )?;
    manager.add_step(
        stage,
        Arc::new(InjectBtpOperatorCredentialsStep::new(
            Arc::clone(operations),
            Arc::clone(&deps.runtime_clients),
        )),
        Some(when_btp_operator_credentials_provided()),
    )?;

    manager.add_step(
        CREATE_KYMA_RESOURCE_STAGE,
        Arc::new(ApplyKymaStep::new(Arc::clone(operations), Arc::clone(&deps.control_plane))),
        None,
    )?;

    info!("Provisioning pipeline ready with stages {:?}", manager.stage_names());
    Ok(manager)
}

/// Worker queue feeding the given manager
pub fn new_provisioning_queue(manager: StagedManager) -> Queue {
    Queue::new(PROVISIONING_QUEUE, Arc::new(manager))
}
