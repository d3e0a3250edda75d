//! Unit tests for the start/resume guard

#[cfg(test)]
mod tests {
    use super::super::start::StartStep;
    use crate::model::{Operation, OperationState, OperationType, SmOperatorCredentials};
    use crate::process::Step;
    use crate::storage::{MemoryStorage, Operations};
    use crate::test_utils::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn step(storage: &MemoryStorage) -> StartStep {
        StartStep::new(Arc::new(storage.clone()), Arc::new(storage.clone()))
    }

    fn pending_operation() -> Operation {
        let mut op = create_test_operation("azure");
        op.state = OperationState::Pending;
        op
    }

    fn deprovisioning(id: &str, state: OperationState) -> Operation {
        let mut op = aged(create_test_operation("azure"), Duration::from_secs(600));
        op.id = id.to_string();
        op.operation_type = OperationType::Deprovision;
        op.state = state;
        op
    }

    #[tokio::test]
    async fn test_pending_operation_becomes_in_progress() {
        init_test_tracing();
        let storage = MemoryStorage::new();
        let op = store_operation(&storage, pending_operation()).await;

        let outcome = step(&storage).run(op).await.unwrap();

        assert!(outcome.is_done());
        assert_eq!(outcome.operation.state, OperationState::InProgress);
        let stored = storage.get_operation_by_id(OPERATION_ID).await.unwrap();
        assert_eq!(stored.state, OperationState::InProgress);
    }

    #[tokio::test]
    async fn test_non_pending_operation_is_untouched() {
        let storage = MemoryStorage::new();
        let op = store_operation(&storage, create_test_operation("azure")).await;

        let outcome = step(&storage).run(op.clone()).await.unwrap();

        assert!(outcome.is_done());
        assert_eq!(outcome.operation, op);
        assert_eq!(storage.get_operation_by_id(OPERATION_ID).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_waits_for_deprovisioning_in_progress() {
        let storage = MemoryStorage::new();
        store_operation(&storage, deprovisioning("deprovisioning-id", OperationState::InProgress)).await;
        let op = store_operation(&storage, pending_operation()).await;

        let outcome = step(&storage).run(op).await.unwrap();

        assert_eq!(outcome.backoff, Duration::from_secs(60));
        assert_eq!(outcome.operation.state, OperationState::Pending);
    }

    #[tokio::test]
    async fn test_restores_instance_details_after_deprovisioning() {
        let storage = MemoryStorage::new();
        store_operation(&storage, deprovisioning("deprovisioning-id", OperationState::Succeeded)).await;
        let mut instance = create_test_instance("azure");
        instance.instance_details.shoot_name = "c-previous".to_string();
        instance.instance_details.shoot_domain = "c-previous.kyma.example.com".to_string();
        store_instance(&storage, instance).await;
        let op = store_operation(&storage, pending_operation()).await;

        let outcome = step(&storage).run(op).await.unwrap();

        assert!(outcome.is_done());
        assert_eq!(outcome.operation.instance_details.shoot_name, "c-previous");
        assert_eq!(
            outcome.operation.instance_details.shoot_domain,
            "c-previous.kyma.example.com"
        );
    }

    #[tokio::test]
    async fn test_fails_when_deprovisioned_instance_is_gone() {
        let storage = MemoryStorage::new();
        store_operation(&storage, deprovisioning("deprovisioning-id", OperationState::Succeeded)).await;
        let op = store_operation(&storage, pending_operation()).await;

        let failure = step(&storage).run(op).await.unwrap_err();

        assert_eq!(failure.message, "The instance does not exists");
        assert_eq!(failure.operation.state, OperationState::Failed);
    }

    #[tokio::test]
    async fn test_inherits_ers_context_from_last_operation() {
        let storage = MemoryStorage::new();
        let mut previous = aged(create_test_operation("azure"), Duration::from_secs(600));
        previous.id = "previous-operation-id".to_string();
        previous.state = OperationState::Succeeded;
        previous.provisioning_parameters.ers_context.commercial_model = Some("subscription".to_string());
        previous.provisioning_parameters.ers_context.sm_operator_credentials = Some(SmOperatorCredentials {
            client_id: "client-id".to_string(),
            ..Default::default()
        });
        store_operation(&storage, previous).await;
        let op = store_operation(&storage, pending_operation()).await;

        let outcome = step(&storage).run(op).await.unwrap();

        let ers = &outcome.operation.provisioning_parameters.ers_context;
        assert_eq!(ers.commercial_model.as_deref(), Some("subscription"));
        assert_eq!(ers.sm_operator_credentials.as_ref().unwrap().client_id, "client-id");
        assert_eq!(ers.license_type.as_deref(), Some("CUSTOMER"));
    }

    #[tokio::test]
    async fn test_conflict_asks_for_short_retry() {
        let storage = MemoryStorage::new();
        let op = store_operation(&storage, pending_operation()).await;
        storage.inject_operation_conflicts(1);

        let outcome = step(&storage).run(op).await.unwrap();

        assert_eq!(outcome.backoff, Duration::from_secs(1));
        assert_eq!(outcome.operation.state, OperationState::Pending);
    }
}
