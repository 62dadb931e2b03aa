use axum::{
    routing::get,
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
};
use std::sync::Arc;
use crate::{
    config::Config,
    handlers,
    middleware,
    services::{DocumentStore, TaskService, UserService},
};

// Application state shared between handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub tasks: TaskService,
    pub users: UserService,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            tasks: TaskService::new(store.clone()),
            users: UserService::new(store.clone()),
            store,
        }
    }
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/api", get(handlers::index))

        // User routes
        .route("/api/users", get(handlers::list_users).post(handlers::create_user))
        .route(
            "/api/users/:id",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )

        // Task routes
        .route("/api/tasks", get(handlers::list_tasks).post(handlers::create_task))
        .route(
            "/api/tasks/:id",
            get(handlers::get_task)
                .put(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .fallback(handlers::not_found)

        // Add middleware
        .layer(from_fn(middleware::log_requests))

        // Body size limit from config, enforced by the Json extractor
        .layer(DefaultBodyLimit::max(config.server.max_body_bytes))

        .with_state(state)
}
