//! Dispatcher errors

use thiserror::Error;

use super::task::TaskId;
use crate::runtime::memory::AllocError;

/// Dispatcher result
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Dispatcher errors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("task pool exhausted: all {capacity} slots are in use")]
    PoolExhausted {
        /// Total slots in the pool
        capacity: usize,
    },

    #[error("invalid task handle {0}: offset outside the task pool")]
    InvalidHandle(TaskId),

    #[error("timed out waiting for {0}")]
    WaitTimeout(TaskId),

    #[error("worker {worker} panicked while running a task")]
    WorkerPanicked {
        /// Index of the worker thread
        worker: usize,
    },

    #[error("invalid dispatcher config: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("task pool allocation failed: {0}")]
    Alloc(AllocError),
}

impl From<AllocError> for DispatchError {
    fn from(err: AllocError) -> Self {
        match err {
            AllocError::Exhausted { capacity } => DispatchError::PoolExhausted { capacity },
            other => DispatchError::Alloc(other),
        }
    }
}
