use axum::extract::{Multipart, State};
use axum::response::Html;
use serde_json::json;
use tracing::info;

use super::AppState;
use crate::error::{AppError, AppResult};

/// Multipart field carrying the uploaded file.
const UPLOAD_FIELD: &str = "fileupload";

/// Final path component of a client-supplied file name; `None` if nothing usable is left.
fn stored_file_name(raw: &str) -> Option<&str> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    match name {
        "" | "." | ".." => None,
        n => Some(n),
    }
}

pub(super) async fn upload_page(State(state): State<AppState>) -> AppResult<Html<String>> {
    state.render("upload", json!({}))
}

/// Store the `fileupload` part under the upload directory with its original name.
/// An existing file of the same name is overwritten.
pub(super) async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> AppResult<&'static str> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::user("upload_malformed", e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let raw = field.file_name().unwrap_or_default().to_string();
        let name = stored_file_name(&raw)
            .ok_or_else(|| AppError::user("upload_bad_name", format!("unusable file name '{raw}'")))?
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::user("upload_malformed", e.body_text()))?;
        let path = state.upload_dir.join(&name);
        tokio::fs::create_dir_all(&state.upload_dir)
            .await
            .map_err(|e| AppError::storage("upload_io", e.to_string()))?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AppError::storage("upload_io", format!("{}: {e}", path.display())))?;
        info!(file = %name, bytes = bytes.len(), "upload stored");
        return Ok("File upload complete.");
    }
    Err(AppError::missing(UPLOAD_FIELD))
}
