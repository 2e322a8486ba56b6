//! Unified application error model and HTTP mapping.
//! Handlers return `AppResult<T>`; storage faults and bad input both end up here and are
//! turned into a response with a matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tracing::error;

use crate::storage::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Auth { code: String, message: String },
    Storage { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Storage { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Storage { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn auth<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn storage<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Storage { code: code.into(), message: msg.into() } }
    pub fn internal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// A required form or query field was absent or blank.
    pub fn missing(field: &str) -> Self {
        AppError::user("validation_missing", format!("missing required field '{field}'"))
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Auth { .. } => 401,
            AppError::Storage { .. } => 500,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let code = match &err {
            StoreError::DuplicateKey { .. } => "storage_duplicate_key",
            StoreError::Io(_) | StoreError::Unavailable(_) => "storage_unavailable",
            StoreError::Serde(_) => "storage_corrupt",
            StoreError::UnsupportedUrl(_) => "storage_config",
        };
        AppError::storage(code, err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal("internal", err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = self.code_str(), "request failed: {}", self.message());
        }
        let body = serde_json::json!({"status": "error", "code": self.code_str(), "error": self.message()});
        (status, Json(body)).into_response()
    }
}
