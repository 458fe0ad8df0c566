use crate::{error::AppError, handlers::AppState};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Handle POST /control/logging
pub async fn toggle_logging(State(state): State<AppState>) -> impl IntoResponse {
    let enabled = state.logger.toggle_logging();
    Json(json!({ "logging_enabled": enabled }))
}

/// Handle POST /control/flush
///
/// Only wakes the flush thread; the flush itself happens in the background.
pub async fn flush(State(state): State<AppState>) -> impl IntoResponse {
    state.logger.request_flush();
    (
        StatusCode::ACCEPTED,
        Json(json!({ "pending": state.logger.store().queue().pending_count() })),
    )
}

/// Handle POST /control/reset
pub async fn reset(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.logger.reset().await?;
    Ok(Json(json!({ "reset": true })))
}
