use axum::{extract::State, Json};
use std::sync::Arc;

use super::AppState;

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "default_hypothesis": state.defaults.hypothesis,
        "default_alpha": state.defaults.alpha,
        "build_profile": if cfg!(debug_assertions) { "debug" } else { "release" },
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
