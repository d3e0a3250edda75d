//! Staged pipeline runner
//!
//! Steps are grouped into named stages. A finished stage is recorded on the
//! operation and skipped when the operation comes back from the queue, so a
//! restart resumes at the first unfinished stage. Within a stage every step
//! runs again on re-entry; steps are idempotent.
//!
//! A step asking for a backoff is re-run in place while the time spent on it
//! stays below `max_step_processing_time`; after that the worker hands the
//! operation back to the queue with the requested backoff.

use super::EngineError;
use super::operation_manager::OperationManager;
use super::queue::Executor;
use super::step::{OperationFailure, Step, StepCondition, StepOutcome, StepResult, StepWithCondition};
use crate::error::{LastError, OPERATION_TIMEOUT_MSG, reason_for_error};
use crate::model::{Operation, OperationState};
use crate::storage::Operations;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span, warn};

const FETCH_ERROR_BACKOFF: Duration = Duration::from_secs(3);
const SAVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Panic payload turned into an error for classification
#[derive(Debug, Error)]
#[error("{0}")]
struct StepPanic(String);

#[derive(Debug)]
struct Stage {
    name: String,
    steps: Vec<StepWithCondition>,
}

/// Runs an operation through its stages
pub struct StagedManager {
    storage: Arc<dyn Operations>,
    stages: Vec<Stage>,
    operation_timeout: Duration,
    max_step_processing_time: Duration,
    speed_factor: u32,
}

impl std::fmt::Debug for StagedManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedManager")
            .field("stages", &self.stages)
            .field("operation_timeout", &self.operation_timeout)
            .field("max_step_processing_time", &self.max_step_processing_time)
            .finish_non_exhaustive()
    }
}

impl StagedManager {
    pub fn new(
        storage: Arc<dyn Operations>,
        operation_timeout: Duration,
        max_step_processing_time: Duration,
    ) -> Self {
        Self {
            storage,
            stages: Vec::new(),
            operation_timeout,
            max_step_processing_time,
            speed_factor: 1,
        }
    }

    /// Divide in-place retry sleeps by `factor`; for tests only
    pub fn speed_up(&mut self, factor: u32) {
        self.speed_factor = factor.max(1);
    }

    /// Replace the stage list; steps are added afterwards
    pub fn define_stages<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stages = names
            .into_iter()
            .map(|name| Stage {
                name: name.into(),
                steps: Vec::new(),
            })
            .collect();
    }

    pub fn add_step(
        &mut self,
        stage: &str,
        step: Arc<dyn Step>,
        condition: Option<StepCondition>,
    ) -> Result<(), EngineError> {
        let target = self
            .stages
            .iter_mut()
            .find(|s| s.name == stage)
            .ok_or_else(|| EngineError::UnknownStage(stage.to_string()))?;
        target.steps.push(StepWithCondition { step, condition });
        Ok(())
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Names of the steps in a stage, in execution order
    pub fn step_names(&self, stage: &str) -> Vec<&'static str> {
        self.stages
            .iter()
            .find(|s| s.name == stage)
            .map(|s| s.steps.iter().map(|st| st.step.name()).collect())
            .unwrap_or_default()
    }

    /// Process one operation as far as it goes
    ///
    /// Returns the delay after which the operation must be executed again,
    /// zero when there is nothing more to do.
    pub async fn execute(&self, operation_id: &str) -> Result<Duration, EngineError> {
        let operation = match self.storage.get_operation_by_id(operation_id).await {
            Ok(op) => op,
            Err(e) => {
                error!("Cannot fetch operation {} from storage: {}", operation_id, e);
                return Ok(FETCH_ERROR_BACKOFF);
            }
        };

        let span = info_span!(
            "operation",
            operation_id = %operation.id,
            instance_id = %operation.instance_id,
            plan_id = %operation.provisioning_parameters.plan_id
        );
        self.process(operation).instrument(span).await
    }

    async fn process(&self, operation: Operation) -> Result<Duration, EngineError> {
        if operation.state.is_terminal() {
            info!("Operation is already {}, nothing to do", operation.state);
            return Ok(Duration::ZERO);
        }

        info!(
            "Start processing operation steps for global account {}",
            operation.provisioning_parameters.ers_context.global_account_id
        );

        if operation.time_since_creation() > self.operation_timeout {
            return self.fail_on_timeout(operation).await;
        }

        let mut processed = operation;
        for stage in &self.stages {
            if processed.is_stage_finished(&stage.name) {
                continue;
            }

            for step in &stage.steps {
                if !step.applies_to(&processed) {
                    debug!("Skipping step {} in stage {}", step.step.name(), stage.name);
                    continue;
                }

                let outcome = match self.run_step(step.step.as_ref(), processed).await {
                    Ok(outcome) => outcome,
                    Err(failure) => {
                        error!(
                            "Step {} failed the operation: {} (reason: {}, component: {})",
                            step.step.name(),
                            failure.message,
                            failure.last_error.reason,
                            failure.last_error.component
                        );
                        return Err(EngineError::Failed(failure));
                    }
                };
                processed = outcome.operation;

                if processed.state.is_terminal() {
                    info!("Operation {} got status {}, process finished", processed.id, processed.state);
                    return Ok(Duration::ZERO);
                }
                if !outcome.backoff.is_zero() {
                    warn!(
                        "Retrying step {} by restarting the operation in {:?}",
                        step.step.name(),
                        outcome.backoff
                    );
                    return Ok(outcome.backoff);
                }
            }

            processed = match self.save_finished_stage(processed, &stage.name).await {
                Ok(op) => op,
                Err(backoff) => return Ok(backoff),
            };
        }

        processed.state = OperationState::Succeeded;
        processed.description = "Processing finished".to_string();
        match self.storage.update_operation(processed).await {
            Ok(_) => {
                info!("Operation succeeded");
                Ok(Duration::ZERO)
            }
            Err(e) if e.is_not_found() => Ok(Duration::ZERO),
            Err(e) => {
                error!("Unable to save operation with finished processing: {}", e);
                Ok(SAVE_ERROR_BACKOFF)
            }
        }
    }

    async fn fail_on_timeout(&self, mut operation: Operation) -> Result<Duration, EngineError> {
        info!(
            "Operation has reached the time limit: operation was created at {}",
            operation.created_at
        );
        let last_error = LastError::timeout(OPERATION_TIMEOUT_MSG);
        operation.state = OperationState::Failed;
        operation.last_error = last_error.clone();

        match self.storage.update_operation(operation.clone()).await {
            Ok(stored) => Err(EngineError::Failed(OperationFailure {
                operation: Box::new(stored),
                message: OPERATION_TIMEOUT_MSG.to_string(),
                last_error,
            })),
            Err(e) => {
                error!("Unable to save timed out operation: {}", e);
                Ok(SAVE_ERROR_BACKOFF)
            }
        }
    }

    async fn save_finished_stage(&self, mut operation: Operation, stage: &str) -> Result<Operation, Duration> {
        operation.finished_stages.push(stage.to_string());
        match self.storage.update_operation(operation.clone()).await {
            Ok(stored) => {
                info!("Finished stage {}", stage);
                Ok(stored)
            }
            // the record may be gone at the end of a deprovisioning
            Err(e) if e.is_not_found() => Ok(operation),
            Err(e) => {
                warn!("Unable to save operation with finished stage {}: {}", stage, e);
                Err(SAVE_ERROR_BACKOFF)
            }
        }
    }

    /// Run one step, retrying in place until it is done or has used up its time
    async fn run_step(&self, step: &dyn Step, operation: Operation) -> StepResult {
        let begin = Instant::now();
        let mut processed = operation;

        loop {
            let span = info_span!("step", step = %step.name(), operation_id = %processed.id);
            let result = self.invoke(step, processed.clone()).instrument(span).await;

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(failure) => {
                    return match self.ensure_failed(step, failure).await {
                        Ok(failure) => Err(failure),
                        Err(backoff) => Ok(StepOutcome::retry_after(processed, backoff)),
                    };
                }
            };

            if outcome.is_done() || begin.elapsed() > self.max_step_processing_time {
                return Ok(outcome);
            }
            debug!("Step {} sleeping for {:?}", step.name(), outcome.backoff);
            tokio::time::sleep(outcome.backoff / self.speed_factor).await;
            processed = outcome.operation;
        }
    }

    /// Call the step, turning a panic into a failed operation
    async fn invoke(&self, step: &dyn Step, operation: Operation) -> StepResult {
        info!("Start step");
        match AssertUnwindSafe(step.run(operation.clone())).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Panic in step {}: {}", step.name(), message);
                let cause = StepPanic(message);
                OperationManager::new(Arc::clone(&self.storage), step.name(), step.component())
                    .operation_failed(operation, "recovered from panic", Some(&cause))
                    .await
            }
        }
    }

    /// A step error is terminal even when the step did not persist the failure itself
    ///
    /// When the Failed state cannot be stored the step is run again after a
    /// backoff, so the operation is not left behind `InProgress`.
    async fn ensure_failed(&self, step: &dyn Step, mut failure: OperationFailure) -> Result<OperationFailure, Duration> {
        if failure.operation.state == OperationState::Failed {
            return Ok(failure);
        }
        warn!("Step {} returned an error without failing the operation", step.name());
        let mut last_error = reason_for_error(&failure);
        if last_error.step.is_empty() {
            last_error.step = step.name().to_string();
        }
        failure.operation.state = OperationState::Failed;
        failure.operation.last_error = last_error.clone();
        match self.storage.update_operation((*failure.operation).clone()).await {
            Ok(stored) => failure.operation = Box::new(stored),
            Err(e) => {
                error!("Unable to save operation with the last error from step {}: {}", step.name(), e);
                return Err(SAVE_ERROR_BACKOFF);
            }
        }
        failure.last_error = last_error;
        Ok(failure)
    }
}

#[async_trait::async_trait]
impl Executor for StagedManager {
    async fn execute(&self, operation_id: &str) -> Result<Duration, EngineError> {
        StagedManager::execute(self, operation_id).await
    }
}

