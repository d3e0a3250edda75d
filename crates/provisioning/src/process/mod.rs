//! Pipeline machinery
//!
//! Steps are grouped into stages and driven by [`StagedManager`]; a
//! [`Queue`] of operation ids feeds the manager from a pool of workers.

pub mod operation_manager;
#[cfg(test)]
mod operation_manager_test;
pub mod queue;
pub mod staged_manager;
pub mod step;

use crate::storage::StorageError;
use thiserror::Error;

pub use operation_manager::OperationManager;
pub use queue::{Executor, Queue};
pub use staged_manager::StagedManager;
pub use step::{OperationFailure, Step, StepCondition, StepOutcome, StepResult, StepWithCondition};

/// Errors surfaced by the pipeline runner
#[derive(Debug, Error)]
pub enum EngineError {
    /// Operation could not be loaded or saved
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Operation reached the Failed state
    #[error("operation failed: {0}")]
    Failed(#[from] OperationFailure),

    /// Step added to a stage that was never defined
    #[error("stage {0} is not defined")]
    UnknownStage(String),
}
