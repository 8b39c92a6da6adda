use axum::{
    extract::{Json, State},
    http::Uri,
    response::IntoResponse,
};
use serde_json::json;

use crate::{errors::HttpError, state::HttpState};

pub async fn bridge_diagnostics(
    State(state): State<HttpState>,
) -> Result<impl IntoResponse, HttpError> {
    let response = state.app.services.diagnostics.snapshot()?;
    Ok(Json(response))
}

pub async fn healthcheck() -> impl IntoResponse {
    Json(json!({}))
}

pub async fn not_found(uri: Uri) -> HttpError {
    HttpError::not_found(uri.path())
}
