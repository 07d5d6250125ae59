// SPDX-License-Identifier: MIT

use squad_core::error::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Wal(#[from] crate::wal::WalError),

    #[error("execution {0} not found")]
    ExecutionNotFound(String),

    #[error("step ({execution_id}, {step}) already has a successful attempt")]
    StepAlreadySucceeded { execution_id: String, step: String },

    #[error("lease conflict on execution {0}")]
    LeaseConflict(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::Wal(_) => CoreError::Transient(err.to_string()),
            StoreError::ExecutionNotFound(id) => CoreError::not_found("execution", id.clone()),
            StoreError::StepAlreadySucceeded { .. } => CoreError::Conflict(err.to_string()),
            StoreError::LeaseConflict(_) => CoreError::Conflict(err.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
