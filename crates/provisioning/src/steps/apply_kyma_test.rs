#[cfg(test)]
mod tests {
    use super::super::apply_kyma::ApplyKymaStep;
    use super::super::labels::{
        INSTANCE_ID_LABEL, INTERNAL_LABEL, KYMA_NAME_LABEL, PLATFORM_REGION_LABEL, PLAN_NAME_LABEL,
        SKR_DOMAIN_ANNOTATION,
    };
    use crate::config::DEFAULT_KYMA_TEMPLATE;
    use crate::error::{Component, Reason};
    use crate::k8s::MockControlPlaneClient;
    use crate::model::Operation;
    use crate::process::Step;
    use crate::storage::{MemoryStorage, Operations};
    use crate::test_utils::*;
    use crds::kyma_api_resource;
    use kube::api::DynamicObject;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn operation() -> Operation {
        let mut op = create_test_operation_with_runtime("azure");
        op.kyma_template = DEFAULT_KYMA_TEMPLATE.to_string();
        op.instance_details.shoot_domain = "c-12345.kyma.example.com".to_string();
        op
    }

    fn step(storage: &MemoryStorage, control_plane: &MockControlPlaneClient) -> ApplyKymaStep {
        ApplyKymaStep::new(Arc::new(storage.clone()), Arc::new(control_plane.clone()))
    }

    #[tokio::test]
    async fn test_creates_kyma_resource() {
        init_test_tracing();
        let storage = MemoryStorage::new();
        let control_plane = MockControlPlaneClient::new();
        let op = store_operation(&storage, operation()).await;

        let outcome = step(&storage, &control_plane).run(op).await.unwrap();

        assert!(outcome.is_done());
        assert_eq!(control_plane.writes(), vec![format!("CREATE Kyma/kyma-system/{RUNTIME_ID}")]);
        let kyma = control_plane.object(&kyma_api_resource(), "kyma-system", RUNTIME_ID).unwrap();
        let labels = kyma.metadata.labels.unwrap();
        assert_eq!(labels[INSTANCE_ID_LABEL], INSTANCE_ID);
        assert_eq!(labels[PLAN_NAME_LABEL], "azure");
        assert_eq!(
            kyma.metadata.annotations.unwrap()[SKR_DOMAIN_ANNOTATION],
            "c-12345.kyma.example.com"
        );
        assert_eq!(kyma.data["spec"]["channel"], "regular");
    }

    #[tokio::test]
    async fn test_existing_resource_keeps_spec_and_gets_labels() {
        let storage = MemoryStorage::new();
        let control_plane = MockControlPlaneClient::new();
        let resource = kyma_api_resource();
        let mut existing = DynamicObject::new(RUNTIME_ID, &resource).within("kyma-system");
        existing.metadata.labels = Some(BTreeMap::from([("custom".to_string(), "kept".to_string())]));
        existing.data = json!({ "spec": { "channel": "fast", "modules": [{ "name": "istio" }] } });
        control_plane.insert_object(&resource, existing);
        let op = store_operation(&storage, operation()).await;

        let outcome = step(&storage, &control_plane).run(op).await.unwrap();

        assert!(outcome.is_done());
        assert_eq!(control_plane.writes(), vec![format!("UPDATE Kyma/kyma-system/{RUNTIME_ID}")]);
        let kyma = control_plane.object(&resource, "kyma-system", RUNTIME_ID).unwrap();
        let labels = kyma.metadata.labels.unwrap();
        assert_eq!(labels["custom"], "kept");
        assert_eq!(labels[INSTANCE_ID_LABEL], INSTANCE_ID);
        assert_eq!(kyma.data["spec"]["channel"], "fast");
    }

    #[tokio::test]
    async fn test_customer_labels_without_internal_flag() {
        let storage = MemoryStorage::new();
        let control_plane = MockControlPlaneClient::new();
        let mut op = operation();
        op.provisioning_parameters.platform_region = "westeurope".to_string();
        let op = store_operation(&storage, op).await;

        step(&storage, &control_plane).run(op).await.unwrap();

        let kymas = control_plane.objects(&kyma_api_resource());
        assert_eq!(kymas.len(), 1);
        let labels = kymas[0].metadata.labels.clone().unwrap();
        assert_eq!(labels[PLAN_NAME_LABEL], "azure");
        assert_eq!(labels[PLATFORM_REGION_LABEL], "westeurope");
        assert_eq!(labels[KYMA_NAME_LABEL], RUNTIME_ID);
        assert!(!labels.contains_key(INTERNAL_LABEL));
    }

    #[tokio::test]
    async fn test_bare_existing_resource_gets_mandatory_labels() {
        let storage = MemoryStorage::new();
        let control_plane = MockControlPlaneClient::new();
        let resource = kyma_api_resource();
        let mut existing = DynamicObject::new(RUNTIME_ID, &resource).within("kyma-system");
        existing.data = json!({ "spec": { "channel": "stable" } });
        control_plane.insert_object(&resource, existing);
        let op = store_operation(&storage, operation()).await;

        step(&storage, &control_plane).run(op).await.unwrap();

        let kymas = control_plane.objects(&resource);
        assert_eq!(kymas.len(), 1);
        let labels = kymas[0].metadata.labels.clone().unwrap();
        assert_eq!(labels[INSTANCE_ID_LABEL], INSTANCE_ID);
        assert_eq!(labels[KYMA_NAME_LABEL], RUNTIME_ID);
        assert_eq!(kymas[0].data["spec"]["channel"], "stable");
    }

    #[tokio::test]
    async fn test_namespace_comes_from_operation() {
        let storage = MemoryStorage::new();
        let control_plane = MockControlPlaneClient::new();
        let mut op = operation();
        op.instance_details.kyma_resource_namespace = "namespace-in-time-of-creation".to_string();
        let op = store_operation(&storage, op).await;

        let outcome = step(&storage, &control_plane).run(op).await.unwrap();

        assert!(
            control_plane
                .object(&kyma_api_resource(), "namespace-in-time-of-creation", RUNTIME_ID)
                .is_some()
        );
        assert!(control_plane.object(&kyma_api_resource(), "kyma-system", RUNTIME_ID).is_none());
        assert_eq!(
            outcome.operation.instance_details.kyma_resource_namespace,
            "namespace-in-time-of-creation"
        );
    }

    #[tokio::test]
    async fn test_unchanged_resource_is_still_updated() {
        let storage = MemoryStorage::new();
        let control_plane = MockControlPlaneClient::new();
        let op = store_operation(&storage, operation()).await;

        let outcome = step(&storage, &control_plane).run(op).await.unwrap();
        step(&storage, &control_plane).run(outcome.operation).await.unwrap();

        assert_eq!(
            control_plane.writes(),
            vec![
                format!("CREATE Kyma/kyma-system/{RUNTIME_ID}"),
                format!("UPDATE Kyma/kyma-system/{RUNTIME_ID}")
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_resource_name_is_derived_and_stored() {
        let storage = MemoryStorage::new();
        let control_plane = MockControlPlaneClient::new();
        let mut op = operation();
        op.instance_details.runtime_id = "ABC-Runtime".to_string();
        op.instance_details.kyma_resource_name = String::new();
        let op = store_operation(&storage, op).await;

        let outcome = step(&storage, &control_plane).run(op).await.unwrap();

        assert_eq!(outcome.operation.instance_details.kyma_resource_name, "abc-runtime");
        let stored = storage.get_operation_by_id(OPERATION_ID).await.unwrap();
        assert_eq!(stored.instance_details.kyma_resource_name, "abc-runtime");
        assert!(control_plane.object(&kyma_api_resource(), "kyma-system", "abc-runtime").is_some());
    }

    #[tokio::test]
    async fn test_invalid_template_fails() {
        let storage = MemoryStorage::new();
        let control_plane = MockControlPlaneClient::new();
        let mut op = operation();
        op.kyma_template = "kind: [unterminated".to_string();
        let op = store_operation(&storage, op).await;

        let failure = step(&storage, &control_plane).run(op).await.unwrap_err();

        assert_eq!(failure.message, "unable to create a kyma template");
        assert_eq!(failure.last_error.component, Component::LIFECYCLE_MANAGER);
    }

    #[tokio::test]
    async fn test_api_errors_are_retried_then_attributed_to_k8s_client() {
        let storage = MemoryStorage::new();
        let control_plane = MockControlPlaneClient::new();
        control_plane.fail_with(403, "Forbidden");
        let op = store_operation(&storage, operation()).await;

        let outcome = step(&storage, &control_plane).run(op).await.unwrap();
        assert_eq!(outcome.backoff, Duration::from_secs(1));

        let old = aged(outcome.operation, Duration::from_secs(11));
        let failure = step(&storage, &control_plane).run(old).await.unwrap_err();
        assert_eq!(failure.last_error.reason, Reason::new("Forbidden"));
        assert_eq!(failure.last_error.component, Component::K8S_CLIENT);
    }
}
