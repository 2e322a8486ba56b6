//! `/shop` sub-router. Mounted behind the login gate as a whole.

use axum::routing::get;
use axum::Router;

use super::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/shirts", get(|| async { "Shirts" }))
        .route("/pants", get(|| async { "Pants" }))
}
