use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::middleware_stages::{clear_session_cookie, set_session_cookie, AuthUser};
use super::{blocking, required, AppState};
use crate::error::{AppError, AppResult};
use crate::identity::{RequestContext, VerifyOutcome};

#[derive(Debug, Deserialize)]
pub(super) struct CredentialForm {
    id: Option<String>,
    pw: Option<String>,
}

pub(super) async fn login_page(State(state): State<AppState>) -> AppResult<Html<String>> {
    state.render("login", json!({}))
}

pub(super) async fn login(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<CredentialForm>,
) -> AppResult<Response> {
    let id = required(form.id, "id")?;
    let pw = form.pw.ok_or_else(|| AppError::missing("pw"))?;

    let cred = match state.verifier.verify(&id, &pw)? {
        VerifyOutcome::Authenticated(cred) => cred,
        failed => {
            info!(user = %id, reason = failed.message(), "login rejected");
            return Err(AppError::auth("login_failed", failed.message()));
        }
    };

    // a fresh id on every login; the previous session, if any, is dropped
    if let Some(old) = ctx.session_id.as_deref() {
        state.sessions.clear(old);
    }
    let token = state.identities.serialize(&cred);
    let sid = state
        .sessions
        .issue(token)
        .map_err(|e| AppError::internal("session_issue", e.to_string()))?;
    let cookie = set_session_cookie(&sid, state.secure_cookies)?;
    info!(user = %cred.id, "login");
    Ok(([(SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}

pub(super) async fn logout(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Response> {
    if let Some(sid) = ctx.session_id.as_deref() {
        if state.sessions.clear(sid) {
            info!(user = ctx.user_id().unwrap_or("-"), "logout");
        }
    }
    let cookie = clear_session_cookie(state.secure_cookies)?;
    Ok(([(SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}

/// The secret may be empty but must be present.
pub(super) async fn register(
    State(state): State<AppState>,
    Form(form): Form<CredentialForm>,
) -> AppResult<Redirect> {
    let id = required(form.id, "id")?;
    let pw = form.pw.ok_or_else(|| AppError::missing("pw"))?;
    let verifier = state.verifier.clone();
    let registered = id.clone();
    blocking(move || verifier.register(&registered, &pw)).await?;
    info!(user = %id, scheme = state.verifier.scheme_name(), "registered");
    Ok(Redirect::to("/"))
}

pub(super) async fn mypage(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<Html<String>> {
    state.render("mypage", json!({ "user": { "id": user.id } }))
}
