//! Static views that need no storage.

use axum::extract::State;
use axum::response::Html;
use serde_json::json;

use super::AppState;
use crate::error::AppResult;

pub(super) async fn index(State(state): State<AppState>) -> AppResult<Html<String>> {
    state.render("index", json!({}))
}

pub(super) async fn write(State(state): State<AppState>) -> AppResult<Html<String>> {
    state.render("write", json!({}))
}
