//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::TreeError;

/// Error produced by a save hook.
pub type SaveError = Box<dyn std::error::Error + Send + Sync>;

/// Failures captured by the store. Only their Display text reaches snapshots.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{role} node \"{key}\" not found")]
    NotFound { role: &'static str, key: String },

    #[error("invalid node value: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    #[error("{reason}")]
    StructuralRejection { reason: String },

    #[error("save failed: {0}")]
    PersistenceFailure(#[source] SaveError),
}

impl StoreError {
    pub fn not_found(role: &'static str, key: &str) -> Self {
        Self::NotFound {
            role,
            key: key.to_string(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::StructuralRejection {
            reason: reason.into(),
        }
    }
}

impl From<TreeError> for StoreError {
    fn from(e: TreeError) -> Self {
        match e {
            TreeError::NotFound(key) => Self::NotFound { role: "tree", key },
            other => Self::rejected(other.to_string()),
        }
    }
}

/// Application errors wrap store and domain errors and add configuration concerns.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Tree(#[from] TreeError),

    #[error("config error: {message}")]
    Config { message: String },
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
