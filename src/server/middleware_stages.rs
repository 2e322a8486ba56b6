//! Request stages that run ahead of the handlers: the `_method` override, session
//! identity resolution and the login gate, plus the extractors handlers use to read the
//! resolved identity.

use std::convert::Infallible;

use axum::extract::{FromRequestParts, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::{gate, Credential, GateDecision, RequestContext, LOGIN_REQUIRED};

pub const SESSION_COOKIE: &str = "board_session";

pub(crate) fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for value in headers.get_all(axum::http::header::COOKIE) {
        let Ok(s) = value.to_str() else { continue; };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name { return Some(v.to_string()); }
            }
        }
    }
    None
}

/// Browser-session cookie (no Max-Age); expiry is enforced server-side as an idle timeout.
pub(crate) fn set_session_cookie(sid: &str, secure: bool) -> AppResult<HeaderValue> {
    // HttpOnly cookie scoped to path / with SameSite=Strict
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/{}",
        SESSION_COOKIE, sid, secure
    ))
    .map_err(|e| AppError::internal("session_cookie", e.to_string()))
}

pub(crate) fn clear_session_cookie(secure: bool) -> AppResult<HeaderValue> {
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{}=deleted; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Strict; Path=/{}",
        SESSION_COOKIE, secure
    ))
    .map_err(|e| AppError::internal("session_cookie", e.to_string()))
}

#[derive(Debug, Deserialize)]
struct OverrideQuery {
    #[serde(rename = "_method")]
    method: Option<String>,
}

/// Turn `POST ...?_method=PUT` (or `DELETE`) into that method so HTML forms can reach
/// the `PUT` and `DELETE` routes. Any other request passes through unchanged.
///
/// Must wrap the router: middleware added with `Router::layer` runs after routing.
pub fn method_override(mut req: Request) -> Request {
    if req.method() != Method::POST {
        return req;
    }
    let wanted = Query::<OverrideQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(q)| q.method)
        .map(|m| m.trim().to_ascii_uppercase());
    let method = match wanted.as_deref() {
        Some("PUT") => Method::PUT,
        Some("DELETE") => Method::DELETE,
        _ => return req,
    };
    debug!(path = %req.uri().path(), %method, "method override");
    *req.method_mut() = method;
    req
}

fn reject(message: &'static str) -> Response {
    (StatusCode::UNAUTHORIZED, message).into_response()
}

/// Attach a `RequestContext` to every request.
///
/// A session whose credential has disappeared is cleared and the request continues
/// anonymously. A storage fault while rehydrating fails the request.
pub async fn resolve_identity(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let session_id = parse_cookie(req.headers(), SESSION_COOKIE);
    let mut ctx = RequestContext { user: None, session_id };
    if let Some(sid) = ctx.session_id.as_deref() {
        if let Some(token) = state.sessions.resolve(sid) {
            match state.identities.deserialize(&token) {
                Ok(Some(cred)) => ctx.user = Some(cred),
                Ok(None) => {
                    warn!(user = %token, "credential behind session no longer exists; clearing session");
                    state.sessions.clear(sid);
                }
                Err(e) => return AppError::from(e).into_response(),
            }
        }
    }
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

/// Gate stage: continue only for requests with a resolved identity.
pub async fn require_identity(req: Request, next: Next) -> Response {
    let user = req.extensions().get::<RequestContext>().and_then(|c| c.user.as_ref());
    match gate(user) {
        GateDecision::Proceed => next.run(req).await,
        GateDecision::Reject(message) => reject(message),
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<RequestContext>().cloned().unwrap_or_default())
    }
}

/// The logged-in user. Rejects exactly like the gate when there is none.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Credential);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .and_then(|c| c.user.clone())
            .map(AuthUser)
            .ok_or_else(|| reject(LOGIN_REQUIRED))
    }
}
