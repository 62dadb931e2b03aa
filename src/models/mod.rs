mod user;
mod forms;
pub mod task;
mod response;

pub use user::User;
pub use forms::{TaskInput, UserInput, ListParams, GetParams};
pub use task::Task;
pub use response::ApiResponse;

use uuid::Uuid;
use crate::errors::{AppError, AppResult};

// Identifiers arrive as strings; a malformed one is a validation error, not a miss.
pub fn parse_id(raw: &str, what: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Validation(format!("Invalid {} id: {}", what, raw)))
}

// A required string field: present and not blank
pub fn required(value: Option<String>, field: &str) -> AppResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(AppError::Validation(format!("Missing {}", field))),
    }
}
