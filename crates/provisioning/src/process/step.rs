//! Step contract
//!
//! A step receives an operation snapshot and answers with one of:
//! - `Ok` with zero backoff: done, go on with the next step
//! - `Ok` with a backoff: run me again after at least that long
//! - `Err`: the operation failed, stop processing it

use crate::error::{Component, LastError};
use crate::model::Operation;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Successful step result
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub operation: Operation,
    pub backoff: Duration,
}

impl StepOutcome {
    /// Step finished
    pub fn done(operation: Operation) -> Self {
        Self {
            operation,
            backoff: Duration::ZERO,
        }
    }

    /// Step wants to run again after `backoff`
    pub fn retry_after(operation: Operation, backoff: Duration) -> Self {
        Self { operation, backoff }
    }

    pub fn is_done(&self) -> bool {
        self.backoff.is_zero()
    }
}

/// Terminal step failure
///
/// Produced by `OperationManager::operation_failed`, which has already
/// persisted the failed operation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct OperationFailure {
    pub operation: Box<Operation>,
    pub message: String,
    pub last_error: LastError,
}

pub type StepResult = Result<StepOutcome, OperationFailure>;

/// A unit of pipeline work
#[async_trait::async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    /// Component blamed when the step fails without a more specific cause
    fn component(&self) -> Component {
        Component::KEB
    }

    async fn run(&self, operation: Operation) -> StepResult;
}

/// Predicate deciding whether a step runs for the current operation
pub type StepCondition = Arc<dyn Fn(&Operation) -> bool + Send + Sync>;

/// A step together with its optional condition
#[derive(Clone)]
pub struct StepWithCondition {
    pub step: Arc<dyn Step>,
    pub condition: Option<StepCondition>,
}

impl StepWithCondition {
    /// Whether the step applies to the operation as it is right now
    pub fn applies_to(&self, operation: &Operation) -> bool {
        self.condition.as_ref().is_none_or(|condition| condition(operation))
    }
}

impl std::fmt::Debug for StepWithCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepWithCondition")
            .field("step", &self.step.name())
            .field("conditional", &self.condition.is_some())
            .finish()
    }
}
