use thiserror::Error;
use uuid::Uuid;

use crate::domain::Role;

/// Failure taxonomy of the workflow engine. Every variant is recoverable at
/// the caller; none should abort the process.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{role} cannot act on an entity in status {status}")]
    InvalidStage { status: &'static str, role: Role },

    #[error("entity is already terminal in status {status}")]
    AlreadyTerminal { status: &'static str },

    #[error("{entity} {id} was modified concurrently, refresh and retry")]
    Conflict { entity: &'static str, id: Uuid },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl WorkflowError {
    pub fn validation(msg: impl Into<String>) -> Self {
        WorkflowError::Validation(msg.into())
    }
}
