use thiserror::Error;
use redis::RedisError;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // A stored record could not be interpreted (bad key, bad id)
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    // Batch preconditions that no longer held at commit time
    #[error("User {0} no longer exists")]
    MissingUser(Uuid),

    #[error("Email {0} is owned by another user")]
    EmailTaken(String),

    #[error("User {0} picked up new tasks while being deleted")]
    PendingChanged(Uuid),
}

pub type StoreResult<T> = Result<T, StoreError>;
