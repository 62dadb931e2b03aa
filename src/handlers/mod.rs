mod home;
mod task;
mod user;

pub use home::{index, not_found};
pub use task::{list_tasks, create_task, get_task, update_task, delete_task};
pub use user::{list_users, create_user, get_user, update_user, delete_user};

use crate::errors::AppError;

// Extractor rejections (bad JSON, wrong content type, bad query string) are
// client errors and get the same envelope as every other 400.
fn invalid_request(rejection: impl std::fmt::Display) -> AppError {
    AppError::Validation(format!("Invalid request: {}", rejection))
}
