use serde::{Deserialize, Serialize};

// Envelope every endpoint answers with: {message, data}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }

    pub fn ok(data: T) -> Self {
        Self::new("OK", data)
    }
}
