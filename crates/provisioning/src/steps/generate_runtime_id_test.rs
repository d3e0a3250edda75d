#[cfg(test)]
mod tests {
    use super::super::generate_runtime_id::GenerateRuntimeIdStep;
    use crate::process::Step;
    use crate::storage::{Instances, MemoryStorage, Operations};
    use crate::test_utils::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn step(storage: &MemoryStorage) -> GenerateRuntimeIdStep {
        GenerateRuntimeIdStep::new(Arc::new(storage.clone()), Arc::new(storage.clone()))
    }

    #[tokio::test]
    async fn test_generates_runtime_id_once() {
        init_test_tracing();
        let storage = MemoryStorage::new();
        store_instance(&storage, create_test_instance("azure")).await;
        let mut op = create_test_operation("azure");
        op.provisioner_operation_id = "stale".to_string();
        let op = store_operation(&storage, op).await;

        let first = step(&storage).run(op).await.unwrap();
        assert!(first.is_done());
        let runtime_id = first.operation.runtime_id().to_string();
        assert_eq!(runtime_id.len(), 36);
        assert!(uuid::Uuid::parse_str(&runtime_id).is_ok());
        assert!(first.operation.provisioner_operation_id.is_empty());

        let second = step(&storage).run(first.operation).await.unwrap();
        assert!(second.is_done());
        assert_eq!(second.operation.runtime_id(), runtime_id);

        let instance = storage.get_by_id(INSTANCE_ID).await.unwrap();
        assert_eq!(instance.runtime_id, runtime_id);
        assert_eq!(instance.version, 1);
        let stored = storage.get_operation_by_id(OPERATION_ID).await.unwrap();
        assert_eq!(stored.runtime_id(), runtime_id);
    }

    #[tokio::test]
    async fn test_instance_conflict_is_retried_once() {
        let storage = MemoryStorage::new();
        store_instance(&storage, create_test_instance("azure")).await;
        let op = store_operation(&storage, create_test_operation("azure")).await;
        storage.inject_instance_conflicts(1);

        let outcome = step(&storage).run(op).await.unwrap();

        assert!(outcome.is_done());
        let instance = storage.get_by_id(INSTANCE_ID).await.unwrap();
        assert_eq!(instance.runtime_id, outcome.operation.runtime_id());
    }

    #[tokio::test]
    async fn test_repeated_instance_conflict_backs_off() {
        let storage = MemoryStorage::new();
        store_instance(&storage, create_test_instance("azure")).await;
        let op = store_operation(&storage, create_test_operation("azure")).await;
        storage.inject_instance_conflicts(2);

        let outcome = step(&storage).run(op).await.unwrap();
        assert_eq!(outcome.backoff, Duration::from_secs(60));
        assert!(storage.get_by_id(INSTANCE_ID).await.unwrap().runtime_id.is_empty());

        // the next run keeps the id and catches the instance up
        let runtime_id = outcome.operation.runtime_id().to_string();
        let outcome = step(&storage).run(outcome.operation).await.unwrap();
        assert!(outcome.is_done());
        assert_eq!(storage.get_by_id(INSTANCE_ID).await.unwrap().runtime_id, runtime_id);
    }

    #[tokio::test]
    async fn test_operation_conflict_backs_off() {
        let storage = MemoryStorage::new();
        store_instance(&storage, create_test_instance("azure")).await;
        let op = store_operation(&storage, create_test_operation("azure")).await;
        storage.inject_operation_conflicts(1);

        let outcome = step(&storage).run(op).await.unwrap();

        assert_eq!(outcome.backoff, Duration::from_secs(5));
        assert!(outcome.operation.runtime_id().is_empty());
    }
}
