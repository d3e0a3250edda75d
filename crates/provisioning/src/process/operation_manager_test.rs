//! Unit tests for the operation manager

#[cfg(test)]
mod tests {
    use super::super::operation_manager::{CONFLICT_BACKOFF, OperationManager};
    use crate::error::{Component, OPERATION_TIMEOUT_MSG, Reason};
    use crate::model::OperationState;
    use crate::storage::{MemoryStorage, Operations, StorageError};
    use crate::test_utils::*;
    use provisioner_client::GraphQlError;
    use provisioner_client::error::{EXTENSION_ERROR_COMPONENT, EXTENSION_ERROR_REASON};
    use std::sync::Arc;
    use std::time::Duration;

    fn manager(storage: &MemoryStorage, component: Component) -> OperationManager {
        OperationManager::new(Arc::new(storage.clone()), "Test_Step", component)
    }

    #[tokio::test]
    async fn test_update_operation_persists_and_bumps_version() {
        let storage = MemoryStorage::new();
        let op = store_operation(&storage, create_test_operation("azure")).await;

        let outcome = manager(&storage, Component::KEB)
            .update_operation(op, |op| op.description = "updated".to_string())
            .await;

        assert!(outcome.is_done());
        assert_eq!(outcome.operation.version, 1);
        let stored = storage.get_operation_by_id(OPERATION_ID).await.unwrap();
        assert_eq!(stored.description, "updated");
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_update_operation_conflict_rereads() {
        let storage = MemoryStorage::new();
        let op = store_operation(&storage, create_test_operation("azure")).await;
        let m = manager(&storage, Component::KEB);

        // someone else wins the race
        let winner = m
            .update_operation(op.clone(), |op| op.description = "winner".to_string())
            .await;
        assert!(winner.is_done());

        let outcome = m
            .update_operation(op, |op| op.description = "loser".to_string())
            .await;

        assert_eq!(outcome.backoff, CONFLICT_BACKOFF);
        assert_eq!(outcome.operation.description, "winner");
        assert_eq!(outcome.operation.version, 1);
    }

    #[tokio::test]
    async fn test_retry_operation_before_and_after_max() {
        let storage = MemoryStorage::new();
        let m = manager(&storage, Component::PROVISIONER);
        let cause = StorageError::Internal("connection reset".to_string());

        let fresh = store_operation(&storage, create_test_operation("azure")).await;
        let outcome = m
            .retry_operation(fresh, "cannot reach provisioner", Some(&cause), Duration::from_secs(5), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(outcome.backoff, Duration::from_secs(5));
        assert_eq!(outcome.operation.state, OperationState::InProgress);

        let storage = MemoryStorage::new();
        let m = manager(&storage, Component::PROVISIONER);
        let old = store_operation(&storage, aged(create_test_operation("azure"), Duration::from_secs(120))).await;
        let failure = m
            .retry_operation(old, "cannot reach provisioner", Some(&cause), Duration::from_secs(5), Duration::from_secs(60))
            .await
            .unwrap_err();

        assert_eq!(failure.operation.state, OperationState::Failed);
        assert_eq!(failure.last_error.reason, Reason::KEB_INTERNAL);
        assert_eq!(failure.last_error.component, Component::KEB_DB);
        assert_eq!(failure.last_error.step, "Test_Step");
        let stored = storage.get_operation_by_id(OPERATION_ID).await.unwrap();
        assert_eq!(stored.state, OperationState::Failed);
        assert_eq!(stored.description, "cannot reach provisioner");
    }

    #[tokio::test]
    async fn test_operation_failed_adopts_graphql_extensions() {
        let storage = MemoryStorage::new();
        let op = store_operation(&storage, create_test_operation("azure")).await;
        let cause = GraphQlError::new("quota exceeded")
            .with_extension(EXTENSION_ERROR_REASON, "err_quota")
            .with_extension(EXTENSION_ERROR_COMPONENT, "gardener");

        let failure = manager(&storage, Component::PROVISIONER)
            .operation_failed(op, "provisioning failed", Some(&cause))
            .await
            .unwrap_err();

        assert_eq!(failure.last_error.reason, Reason::new("err_quota"));
        assert_eq!(failure.last_error.component, Component::new("gardener"));
        assert_eq!(failure.last_error.message, "quota exceeded");
        assert_eq!(failure.operation.description, "provisioning failed");
    }

    #[tokio::test]
    async fn test_operation_failed_without_cause_blames_step_component() {
        let storage = MemoryStorage::new();
        let op = store_operation(&storage, create_test_operation("azure")).await;

        let failure = manager(&storage, Component::PROVISIONER)
            .operation_failed(op, &format!("{OPERATION_TIMEOUT_MSG}: 6h"), None)
            .await
            .unwrap_err();

        assert_eq!(failure.last_error.reason, Reason::KEB_TIMEOUT);
        assert_eq!(failure.last_error.component, Component::PROVISIONER);
        assert!(failure.last_error.message.contains(OPERATION_TIMEOUT_MSG));
    }

    #[tokio::test]
    async fn test_operation_failed_save_error_asks_for_retry() {
        let storage = MemoryStorage::new();
        let op = store_operation(&storage, create_test_operation("azure")).await;
        storage.inject_operation_conflicts(1);

        let outcome = manager(&storage, Component::KEB)
            .operation_failed(op, "boom", None)
            .await
            .unwrap();

        assert_eq!(outcome.backoff, CONFLICT_BACKOFF);
        assert_eq!(outcome.operation.state, OperationState::InProgress);
    }

    #[tokio::test]
    async fn test_retry_operation_once() {
        let storage = MemoryStorage::new();
        let m = manager(&storage, Component::KEB);

        let op = store_operation(&storage, aged(create_test_operation("azure"), Duration::from_secs(10))).await;
        let outcome = m
            .retry_operation_once(op, "waiting", None, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(outcome.backoff > Duration::ZERO);
        assert!(outcome.backoff <= Duration::from_secs(50));

        let storage = MemoryStorage::new();
        let m = manager(&storage, Component::KEB);
        let op = store_operation(&storage, aged(create_test_operation("azure"), Duration::from_secs(61))).await;
        let failure = m
            .retry_operation_once(op, "waiting", None, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert_eq!(failure.operation.state, OperationState::Failed);
    }

    #[tokio::test]
    async fn test_retry_operation_without_fail_records_step() {
        let storage = MemoryStorage::new();
        let op = store_operation(&storage, aged(create_test_operation("azure"), Duration::from_secs(600))).await;

        let outcome = manager(&storage, Component::KEB)
            .retry_operation_without_fail(op, "giving up on optional work", Duration::from_secs(5), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(outcome.is_done());
        assert_eq!(outcome.operation.state, OperationState::InProgress);
        assert_eq!(outcome.operation.executed_but_not_completed, vec!["Test_Step"]);
    }

    #[tokio::test]
    async fn test_operation_succeeded() {
        let storage = MemoryStorage::new();
        let op = store_operation(&storage, create_test_operation("azure")).await;

        let outcome = manager(&storage, Component::KEB)
            .operation_succeeded(op, "Processing finished")
            .await
            .unwrap();

        assert_eq!(outcome.operation.state, OperationState::Succeeded);
        assert_eq!(outcome.operation.description, "Processing finished");
    }
}
