use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::AppState;

/// Prometheus exposition of every counter and histogram recorded so far.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "metrics recorder not installed".to_string(),
        ),
    }
}
