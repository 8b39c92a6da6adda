use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::debug;

pub async fn log_requests(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(req).await;
    debug!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "diagnostic request served"
    );
    response
}
