//! Runtime resource for the infrastructure manager
//!
//! Gated on the KIM feature matrix. In dry-run mode the resource is only
//! rendered to the log; otherwise it is created once and left alone
//! afterwards, the infrastructure manager owns it from then on.

use super::labels;
use super::shoot::ShootSettings;
use crate::config::Config;
use crate::error::{Component, OPERATION_TIMEOUT_MSG};
use crate::k8s::{ControlPlaneClient, ControlPlaneError};
use crate::model::Operation;
use crate::process::{OperationManager, Step, StepResult};
use crate::provider::{Values, values_for};
use crate::storage::Operations;
use crds::{
    ControlPlane, Egress, FailureTolerance, Filter, HighAvailability, Ingress, Kubernetes, Machine,
    MachineImage, Networking, NetworkingSecurity, Provider, Runtime, RuntimeShoot, RuntimeSpec,
    Security, Volume, Worker,
};
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const WORKER_NAME: &str = "cpu-worker-0";
const NETWORKING_TYPE: &str = "calico";

pub struct CreateRuntimeResourceStep {
    control_plane: Arc<dyn ControlPlaneClient>,
    config: Config,
    operation_manager: OperationManager,
}

impl CreateRuntimeResourceStep {
    pub const NAME: &'static str = "Create_Runtime_Resource";

    pub fn new(
        operations: Arc<dyn Operations>,
        control_plane: Arc<dyn ControlPlaneClient>,
        config: Config,
    ) -> Self {
        Self {
            control_plane,
            config,
            operation_manager: OperationManager::new(operations, Self::NAME, Component::INFRASTRUCTURE_MANAGER),
        }
    }

    /// Runtime resource for the operation, named after `runtime_resource_name`
    pub fn build_runtime(&self, operation: &Operation, values: &Values) -> Runtime {
        let parameters = &operation.provisioning_parameters;
        let details = &operation.instance_details;
        let shoot = ShootSettings::resolve(operation, values);
        let kim = &self.config.kim;
        let plan = operation.plan_name();

        let volume = (values.provider_type != "openstack" && shoot.volume_size_gb > 0).then(|| Volume {
            volume_type: Some(values.disk_type.clone()).filter(|t| !t.is_empty()),
            volume_size: format!("{}Gi", shoot.volume_size_gb),
        });
        let image = (!self.config.machine_image.is_empty()).then(|| MachineImage {
            name: self.config.machine_image.clone(),
            version: Some(self.config.machine_image_version.clone()).filter(|v| !v.is_empty()),
        });
        let failure_tolerance = if self.config.control_plane_failure_tolerance == "zone" {
            "zone"
        } else {
            "node"
        };

        let spec = RuntimeSpec {
            shoot: RuntimeShoot {
                name: details.shoot_name.clone(),
                purpose: values.purpose.clone(),
                platform_region: parameters.platform_region.clone(),
                region: values.region.clone(),
                secret_binding_name: parameters.parameters.target_secret.clone().unwrap_or_default(),
                enforce_seed_location: parameters.parameters.shoot_and_seed_same_region,
                kubernetes: Kubernetes {
                    version: Some(self.config.kubernetes_version.clone()),
                },
                provider: Provider {
                    provider_type: values.provider_type.to_string(),
                    workers: vec![Worker {
                        name: WORKER_NAME.to_string(),
                        machine: Machine {
                            machine_type: shoot.machine_type,
                            image,
                        },
                        minimum: shoot.auto_scaler_min,
                        maximum: shoot.auto_scaler_max,
                        max_surge: Some(shoot.max_surge),
                        max_unavailable: Some(shoot.max_unavailable),
                        zones: shoot.zones,
                        volume,
                    }],
                },
                networking: Networking {
                    pods: shoot.pods_cidr,
                    services: shoot.services_cidr,
                    nodes: shoot.nodes_cidr,
                    networking_type: Some(NETWORKING_TYPE.to_string()),
                },
                control_plane: ControlPlane {
                    high_availability: Some(HighAvailability {
                        failure_tolerance: FailureTolerance {
                            tolerance_type: failure_tolerance.to_string(),
                        },
                    }),
                },
            },
            security: Security {
                administrators: shoot.administrators,
                networking: NetworkingSecurity {
                    filter: Filter {
                        egress: Egress {
                            enabled: !parameters.ers_context.disable_enterprise_policy_filter(),
                        },
                        ingress: Some(Ingress { enabled: false }),
                    },
                },
            },
        };

        let mut runtime = Runtime::new(&details.runtime_resource_name, spec);
        runtime.metadata.namespace = Some(details.kyma_resource_namespace.clone());
        runtime.metadata.labels = Some(labels::runtime_labels(
            operation,
            &values.region,
            kim.view_only && !kim.is_driven_by_kim_only(plan),
        ));
        runtime
    }

    /// Returns whether the resource was created by this call
    async fn create_if_missing(&self, runtime: &Runtime) -> Result<bool, CreateError> {
        let resource = ApiResource::erase::<Runtime>(&());
        let namespace = runtime.metadata.namespace.as_deref().unwrap_or_default();
        let name = runtime.metadata.name.as_deref().unwrap_or_default();

        match self.control_plane.get(&resource, namespace, name).await {
            Ok(_) => {
                info!("Runtime resource {}/{} already exists", namespace, name);
                return Ok(false);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(CreateError::Api(e)),
        }

        let object: DynamicObject = serde_json::to_value(runtime)
            .and_then(serde_json::from_value)
            .map_err(CreateError::Build)?;
        self.control_plane
            .create(&resource, &object)
            .await
            .map_err(CreateError::Api)?;
        info!("Runtime resource {}/{} created", namespace, name);
        Ok(true)
    }
}

enum CreateError {
    Build(serde_json::Error),
    Api(ControlPlaneError),
}

#[async_trait::async_trait]
impl Step for CreateRuntimeResourceStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn component(&self) -> Component {
        Component::INFRASTRUCTURE_MANAGER
    }

    async fn run(&self, operation: Operation) -> StepResult {
        let timeout = self.config.create_runtime_timeout;
        if operation.time_since_update() > timeout {
            let message = format!("{OPERATION_TIMEOUT_MSG}: {timeout:?}");
            return self.operation_manager.operation_failed(operation, &message, None).await;
        }

        let kim = &self.config.kim;
        if !kim.is_enabled_for_plan(operation.plan_name()) {
            info!("KIM is not enabled for plan {}, skipping", operation.plan_name());
            return self.operation_manager.done(operation);
        }

        let values = match values_for(&operation.provisioning_parameters, &self.config) {
            Ok(values) => values,
            Err(e) => {
                return self
                    .operation_manager
                    .operation_failed(operation, "unable to determine provider values", Some(&e))
                    .await;
            }
        };
        let runtime = self.build_runtime(&operation, &values);

        if kim.dry_run {
            match serde_yaml::to_string(&runtime) {
                Ok(yaml) => info!("Runtime resource (dry run):\n{}", yaml),
                Err(e) => info!("Unable to render Runtime resource for dry run: {}", e),
            }
            return self.operation_manager.done(operation);
        }

        match self.create_if_missing(&runtime).await {
            Ok(true) => {}
            Ok(false) => return self.operation_manager.done(operation),
            Err(CreateError::Build(e)) => {
                return self
                    .operation_manager
                    .operation_failed(operation, "unable to build Runtime resource", Some(&e))
                    .await;
            }
            Err(CreateError::Api(e)) => {
                return self
                    .operation_manager
                    .retry_operation(
                        operation,
                        "unable to create Runtime resource",
                        Some(&e),
                        Duration::from_secs(3),
                        Duration::from_secs(20),
                    )
                    .await;
            }
        }

        // recorded only when the resource was created here
        let region = values.region;
        Ok(self
            .operation_manager
            .update_operation(operation, move |op| op.region = region)
            .await)
    }
}
