#[cfg(test)]
mod tests {
    use super::super::initialisation::InitialisationStep;
    use crate::model::{CloudProvider, OperationState};
    use crate::process::Step;
    use crate::storage::{Instances, MemoryStorage};
    use crate::test_utils::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn step(storage: &MemoryStorage) -> InitialisationStep {
        InitialisationStep::new(Arc::new(storage.clone()), Arc::new(storage.clone()))
    }

    #[tokio::test]
    async fn test_persists_provider_on_instance() {
        let storage = MemoryStorage::new();
        store_instance(&storage, create_test_instance("gcp")).await;
        let op = store_operation(&storage, create_test_operation("gcp")).await;

        let outcome = step(&storage).run(op).await.unwrap();

        assert!(outcome.is_done());
        let instance = storage.get_by_id(INSTANCE_ID).await.unwrap();
        assert_eq!(instance.provider, Some(CloudProvider::Gcp));
        assert_eq!(instance.version, 1);

        // provider already stored, nothing to write
        step(&storage).run(outcome.operation).await.unwrap();
        assert_eq!(storage.get_by_id(INSTANCE_ID).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_trial_uses_requested_provider() {
        let storage = MemoryStorage::new();
        store_instance(&storage, create_test_instance("trial")).await;
        let mut op = create_test_operation("trial");
        op.provisioning_parameters.parameters.provider = Some(CloudProvider::Azure);
        let op = store_operation(&storage, op).await;

        step(&storage).run(op).await.unwrap();

        let instance = storage.get_by_id(INSTANCE_ID).await.unwrap();
        assert_eq!(instance.provider, Some(CloudProvider::Azure));
    }

    #[tokio::test]
    async fn test_unknown_plan_fails() {
        let storage = MemoryStorage::new();
        let mut op = create_test_operation("azure");
        op.provisioning_parameters.plan_id = "not-a-plan".to_string();
        let op = store_operation(&storage, op).await;

        let failure = step(&storage).run(op).await.unwrap_err();

        assert_eq!(failure.operation.state, OperationState::Failed);
        assert!(failure.message.contains("not-a-plan"));
    }

    #[tokio::test]
    async fn test_missing_instance_is_retried_then_fails() {
        let storage = MemoryStorage::new();
        let op = store_operation(&storage, create_test_operation("azure")).await;

        let outcome = step(&storage).run(op).await.unwrap();
        assert_eq!(outcome.backoff, Duration::from_secs(1));

        let old = aged(outcome.operation, Duration::from_secs(10));
        let failure = step(&storage).run(old).await.unwrap_err();
        assert_eq!(failure.message, "unable to get instance");
    }
}
