#[cfg(test)]
mod tests {
    use super::super::check_runtime_resource::CheckRuntimeResourceStep;
    use crate::config::{Config, KimConfig};
    use crate::error::Component;
    use crate::k8s::MockControlPlaneClient;
    use crate::process::Step;
    use crate::storage::MemoryStorage;
    use crate::test_utils::*;
    use crds::Runtime;
    use kube::api::DynamicObject;
    use kube::discovery::ApiResource;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn config(view_only: bool, dry_run: bool) -> Config {
        Config {
            kim: KimConfig {
                enabled: true,
                dry_run,
                view_only,
                plans: vec!["azure".to_string()],
                kim_only_plans: Vec::new(),
            },
            ..Config::default()
        }
    }

    fn step(storage: &MemoryStorage, control_plane: &MockControlPlaneClient, config: Config) -> CheckRuntimeResourceStep {
        CheckRuntimeResourceStep::new(Arc::new(storage.clone()), Arc::new(control_plane.clone()), config)
    }

    fn control_plane_with(state: Option<&str>) -> MockControlPlaneClient {
        let control_plane = MockControlPlaneClient::new();
        let resource = ApiResource::erase::<Runtime>(&());
        let mut object = DynamicObject::new(RUNTIME_ID, &resource).within("kyma-system");
        if let Some(state) = state {
            object.data = json!({ "status": { "state": state } });
        }
        control_plane.insert_object(&resource, object);
        control_plane
    }

    #[tokio::test]
    async fn test_ready_runtime_finishes() {
        let storage = MemoryStorage::new();
        let control_plane = control_plane_with(Some("Ready"));
        let op = store_operation(&storage, create_test_operation_with_runtime("azure")).await;

        let outcome = step(&storage, &control_plane, config(false, false)).run(op).await.unwrap();

        assert!(outcome.is_done());
    }

    #[tokio::test]
    async fn test_pending_runtime_is_polled() {
        let storage = MemoryStorage::new();
        let op = store_operation(&storage, create_test_operation_with_runtime("azure")).await;

        for control_plane in [control_plane_with(Some("Pending")), control_plane_with(None)] {
            let outcome = step(&storage, &control_plane, config(false, false))
                .run(op.clone())
                .await
                .unwrap();
            assert_eq!(outcome.backoff, Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn test_failed_runtime_fails_operation() {
        let storage = MemoryStorage::new();
        let control_plane = control_plane_with(Some("Failed"));
        let op = store_operation(&storage, create_test_operation_with_runtime("azure")).await;

        let failure = step(&storage, &control_plane, config(false, false)).run(op).await.unwrap_err();

        assert_eq!(failure.message, "Runtime resource in failed state");
        assert_eq!(failure.last_error.component, Component::INFRASTRUCTURE_MANAGER);
    }

    #[tokio::test]
    async fn test_waiting_too_long_fails() {
        let storage = MemoryStorage::new();
        let control_plane = control_plane_with(Some("Pending"));
        let op = store_operation(&storage, create_test_operation_with_runtime("azure")).await;
        let old = aged(op, Duration::from_secs(61 * 60));

        let failure = step(&storage, &control_plane, config(false, false)).run(old).await.unwrap_err();

        assert_eq!(
            failure.message,
            format!("Waiting for Runtime resource (kyma-system/{RUNTIME_ID}) ready state timeout.")
        );
    }

    #[tokio::test]
    async fn test_missing_runtime_is_retried() {
        let storage = MemoryStorage::new();
        let control_plane = MockControlPlaneClient::new();
        let op = store_operation(&storage, create_test_operation_with_runtime("azure")).await;

        let outcome = step(&storage, &control_plane, config(false, false)).run(op).await.unwrap();

        assert_eq!(outcome.backoff, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_skipped_in_view_only_and_dry_run() {
        let storage = MemoryStorage::new();
        let control_plane = MockControlPlaneClient::new();
        let op = store_operation(&storage, create_test_operation_with_runtime("azure")).await;

        for config in [config(true, false), config(false, true), Config::default()] {
            let outcome = step(&storage, &control_plane, config).run(op.clone()).await.unwrap();
            assert!(outcome.is_done());
        }
    }
}
