//! Helpers every step uses to persist progress, retry and fail

use super::step::{OperationFailure, StepOutcome, StepResult};
use crate::error::{Component, LastError, OPERATION_TIMEOUT_MSG, Reason, reason_for_error};
use crate::model::{Operation, OperationState};
use crate::storage::Operations;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Backoff after an optimistic concurrency conflict
pub const CONFLICT_BACKOFF: Duration = Duration::from_secs(1);
/// Backoff after any other storage failure
pub const STORAGE_ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// Operation manager bound to one step
#[derive(Clone)]
pub struct OperationManager {
    storage: Arc<dyn Operations>,
    step: String,
    component: Component,
}

impl std::fmt::Debug for OperationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationManager")
            .field("step", &self.step)
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

impl OperationManager {
    pub fn new(storage: Arc<dyn Operations>, step: impl Into<String>, component: Component) -> Self {
        Self {
            storage,
            step: step.into(),
            component,
        }
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    /// Apply `mutate` and persist
    ///
    /// Never fails: a conflict hands back the freshly stored operation with a
    /// short backoff, any other storage error the unchanged one with a long
    /// backoff. Callers continue only when the outcome is done.
    pub async fn update_operation<F>(&self, operation: Operation, mutate: F) -> StepOutcome
    where
        F: FnOnce(&mut Operation) + Send,
    {
        let mut updated = operation.clone();
        mutate(&mut updated);
        match self.save(&operation, updated).await {
            Ok(stored) => StepOutcome::done(stored),
            Err(retry) => retry,
        }
    }

    /// Retry after `unit` until the operation has not been updated for `max`, then fail
    pub async fn retry_operation(
        &self,
        operation: Operation,
        message: &str,
        cause: Option<&(dyn StdError + Send + Sync + 'static)>,
        unit: Duration,
        max: Duration,
    ) -> StepResult {
        let elapsed = operation.time_since_update();
        match cause {
            Some(cause) => warn!("{}: {} (retrying, {:?} since last update)", message, cause, elapsed),
            None => warn!("{} (retrying, {:?} since last update)", message, elapsed),
        }
        if elapsed < max {
            return Ok(StepOutcome::retry_after(operation, unit));
        }
        error!("Aborting after {:?} of failing retries", max);
        self.operation_failed(operation, message, cause).await
    }

    /// Wait once for `wait` since the last update, then fail
    pub async fn retry_operation_once(
        &self,
        operation: Operation,
        message: &str,
        cause: Option<&(dyn StdError + Send + Sync + 'static)>,
        wait: Duration,
    ) -> StepResult {
        let elapsed = operation.time_since_update();
        if elapsed < wait {
            warn!("{} (retrying once in {:?})", message, wait - elapsed);
            return Ok(StepOutcome::retry_after(operation, wait - elapsed));
        }
        self.operation_failed(operation, message, cause).await
    }

    /// Retry until `max`, then record the step as not completed and move on
    pub async fn retry_operation_without_fail(
        &self,
        operation: Operation,
        description: &str,
        unit: Duration,
        max: Duration,
    ) -> StepResult {
        if operation.time_since_update() < max {
            warn!("{} (retrying in {:?})", description, unit);
            return Ok(StepOutcome::retry_after(operation, unit));
        }
        error!("Aborting after {:?} of failing retries, step {} is not completed", max, self.step);
        let step = self.step.clone();
        let description = description.to_string();
        Ok(self
            .update_operation(operation, move |op| {
                op.description = description;
                if !op.executed_but_not_completed.contains(&step) {
                    op.executed_but_not_completed.push(step);
                }
            })
            .await)
    }

    /// Mark the operation Succeeded
    pub async fn operation_succeeded(&self, operation: Operation, description: &str) -> StepResult {
        let description = description.to_string();
        Ok(self
            .update_operation(operation, move |op| {
                op.state = OperationState::Succeeded;
                op.description = description;
            })
            .await)
    }

    /// Mark the operation Failed and attribute the failure
    ///
    /// Returns `Err` once the failure is stored. If storing it fails the
    /// step is asked to run again instead.
    pub async fn operation_failed(
        &self,
        operation: Operation,
        description: &str,
        cause: Option<&(dyn StdError + Send + Sync + 'static)>,
    ) -> StepResult {
        let last_error = self.last_error_for(description, cause);
        error!(
            "Operation {} failed in step {}: {} (reason: {}, component: {})",
            operation.id, self.step, last_error.message, last_error.reason, last_error.component
        );

        let mut failed = operation.clone();
        failed.state = OperationState::Failed;
        failed.description = description.to_string();
        failed.last_error = last_error.clone();

        match self.save(&operation, failed).await {
            Ok(stored) => Err(OperationFailure {
                operation: Box::new(stored),
                message: description.to_string(),
                last_error,
            }),
            Err(retry) => Ok(retry),
        }
    }

    fn last_error_for(&self, description: &str, cause: Option<&(dyn StdError + Send + Sync + 'static)>) -> LastError {
        let mut last_error = match cause {
            Some(cause) => reason_for_error(cause),
            None if description.contains(OPERATION_TIMEOUT_MSG) => LastError::timeout(description),
            None => LastError::new(description, Reason::KEB_INTERNAL, Component::KEB),
        };

        if last_error.message.is_empty() {
            last_error.message = description.to_string();
        }
        if last_error.reason.is_empty() {
            last_error.reason = Reason::KEB_INTERNAL;
        }
        // generic attribution is replaced by the step's own component
        if last_error.component.is_empty() || last_error.component == Component::KEB {
            last_error.component = self.component.clone();
        }
        if last_error.step.is_empty() {
            last_error.step = self.step.clone();
        }
        last_error
    }

    async fn save(&self, original: &Operation, updated: Operation) -> Result<Operation, StepOutcome> {
        match self.storage.update_operation(updated).await {
            Ok(stored) => Ok(stored),
            Err(e) if e.is_conflict() => {
                warn!("Conflict while saving operation {}: {}", original.id, e);
                let fresh = match self.storage.get_operation_by_id(&original.id).await {
                    Ok(fresh) => fresh,
                    Err(e) => {
                        error!("Unable to reload operation {}: {}", original.id, e);
                        original.clone()
                    }
                };
                Err(StepOutcome::retry_after(fresh, CONFLICT_BACKOFF))
            }
            Err(e) => {
                error!("Unable to save operation {}: {}", original.id, e);
                Err(StepOutcome::retry_after(original.clone(), STORAGE_ERROR_BACKOFF))
            }
        }
    }

    /// Log and pass through a step's successful completion
    pub fn done(&self, operation: Operation) -> StepResult {
        info!("Step {} finished for operation {}", self.step, operation.id);
        Ok(StepOutcome::done(operation))
    }
}
