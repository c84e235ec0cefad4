use super::domain::ApplicationStatus;
use super::policy::{DenialReason, Operation};
use super::repository::RepositoryError;
use super::storage::StorageError;

/// A persistence or storage collaborator failed. Operational, not a workflow decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DependencyError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Error raised by the onboarding workflow.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not permitted to {operation}")]
    Authorization {
        operation: Operation,
        reason: DenialReason,
    },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("cannot {operation} while application is {status}")]
    InvalidState {
        operation: Operation,
        status: ApplicationStatus,
    },
    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

impl OnboardingError {
    /// Stable label exchanged with callers alongside the message.
    pub const fn kind(&self) -> &'static str {
        match self {
            OnboardingError::Validation(_) => "validation_error",
            OnboardingError::Authorization { .. } => "authorization_error",
            OnboardingError::NotFound(_) => "not_found",
            OnboardingError::InvalidState { .. } => "invalid_state",
            OnboardingError::Dependency(_) => "dependency_error",
        }
    }
}

impl From<RepositoryError> for OnboardingError {
    fn from(value: RepositoryError) -> Self {
        Self::Dependency(DependencyError::Repository(value))
    }
}

impl From<StorageError> for OnboardingError {
    fn from(value: StorageError) -> Self {
        Self::Dependency(DependencyError::Storage(value))
    }
}
