use super::store::StoreError;
use crate::engine::Transition;
use crate::model::ExperimentStatus;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

/// Failure of an experiment operation
///
/// Every variant maps to a stable code returned in the response envelope.
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("Experiment {0} not found")]
    NotFound(Uuid),

    #[error("Variant {0} not found")]
    VariantNotFound(Uuid),

    #[error("{message}")]
    InvalidState {
        transition: Transition,
        status: ExperimentStatus,
        message: String,
    },

    #[error("Experiment needs at least 2 variants to start (has {count})")]
    InsufficientVariants { count: usize },

    #[error("{0}")]
    Unresolvable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl ExperimentError {
    pub fn invalid_state(transition: Transition, status: ExperimentStatus) -> Self {
        ExperimentError::InvalidState {
            transition,
            status,
            message: transition.rejection_message(status),
        }
    }

    /// Map a store error raised inside a guarded write
    ///
    /// A status conflict means the guard failed, a missing row means the
    /// experiment is gone; anything else is a persistence failure.
    pub fn from_store(transition: Transition, err: StoreError) -> Self {
        match err {
            StoreError::StatusConflict { actual, .. } => Self::invalid_state(transition, actual),
            StoreError::ExperimentNotFound(id) => ExperimentError::NotFound(id),
            StoreError::VariantNotFound(id) => ExperimentError::VariantNotFound(id),
            other => ExperimentError::Persistence(other),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ExperimentError::NotFound(_) => "not_found",
            ExperimentError::VariantNotFound(_) => "variant_not_found",
            ExperimentError::InvalidState { .. } => "invalid_state",
            ExperimentError::InsufficientVariants { .. } => "insufficient_variants",
            ExperimentError::Unresolvable(_) => "unresolvable",
            ExperimentError::InvalidInput(_) => "invalid_input",
            ExperimentError::Persistence(_) => "persistence_failure",
        }
    }

    /// Log at the level matching the error class
    pub fn log(&self, operation: &str) {
        match self {
            ExperimentError::Persistence(e) => {
                error!(operation = operation, error = %e, "Experiment operation failed")
            }
            other => info!(
                operation = operation,
                code = other.code(),
                reason = %other,
                "Experiment operation rejected"
            ),
        }
    }
}
