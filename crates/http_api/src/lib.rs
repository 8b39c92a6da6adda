mod errors;
mod handlers;
mod middleware;
mod state;

use axum::{Router, middleware as axum_middleware, routing::get};

pub use errors::HttpError;
pub use state::HttpState;

pub fn router(state: HttpState) -> Router<()> {
    let v1 = Router::new().route("/bridge", get(handlers::bridge_diagnostics));

    Router::new()
        .nest("/v1", v1)
        .route("/healthcheck", get(handlers::healthcheck))
        .fallback(handlers::not_found)
        .layer(axum_middleware::from_fn(middleware::log_requests))
        .with_state(state)
}
