mod memory_store;
mod query;
mod redis_service;
mod store;
mod task_service;
mod user_service;

#[cfg(test)]
pub mod testing;

pub use memory_store::MemoryStore;
pub use redis_service::RedisService;
pub use store::DocumentStore;
pub use task_service::TaskService;
pub use user_service::UserService;
