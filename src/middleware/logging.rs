use axum::{
    middleware::Next,
    response::Response,
    extract::Request,
    body::Body,
};
use std::time::Instant;

pub async fn log_requests(
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis();
    if status.is_server_error() {
        tracing::error!("{} {} -> {} ({} ms)", method, path, status, elapsed_ms);
    } else {
        tracing::info!("{} {} -> {} ({} ms)", method, path, status, elapsed_ms);
    }
    response
}
