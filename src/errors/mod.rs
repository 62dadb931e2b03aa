// Error taxonomy shared by the consistency managers and the HTTP adapter.
use thiserror::Error;

pub mod response;
pub mod store;

pub use store::{StoreError, StoreResult};

#[derive(Error, Debug)]
pub enum AppError {
    // Missing or malformed input: required fields, identifiers, query params
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    NotFound(String),

    // Assignment refused: completed task, or task owned by another user
    #[error("{0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }
}

// A rejected batch precondition reads the same as if the racing write had
// landed before this request started.
impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::MissingUser(id) => AppError::NotFound(format!("User {} not found", id)),
            StoreError::EmailTaken(email) => {
                AppError::Duplicate(format!("Email {} already exists", email))
            }
            StoreError::PendingChanged(id) => AppError::Conflict(format!(
                "User {} was assigned new tasks during the request, retry", id
            )),
            other => AppError::Store(other),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Store(StoreError::Serialization(e))
    }
}

// Custom result type
pub type AppResult<T> = Result<T, AppError>;
