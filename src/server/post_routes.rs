use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, Redirect};
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::middleware_stages::AuthUser;
use super::{blocking, parse_post_id, required, AppState};
use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub(super) struct NewPostForm {
    title: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct EditForm {
    id: Option<String>,
    title: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DeleteForm {
    #[serde(rename = "_id")]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SearchQuery {
    key: Option<String>,
}

pub(super) async fn list(State(state): State<AppState>) -> AppResult<Html<String>> {
    let posts = state.posts.list()?;
    state.render("list", json!({ "posts": posts }))
}

pub(super) async fn detail(State(state): State<AppState>, Path(raw): Path<String>) -> AppResult<Html<String>> {
    let id = parse_post_id(&raw)?;
    let post = state.posts.get(id)?;
    state.render("detail", json!({ "data": post }))
}

pub(super) async fn edit_page(State(state): State<AppState>, Path(raw): Path<String>) -> AppResult<Html<String>> {
    let id = parse_post_id(&raw)?;
    let post = state.posts.get(id)?;
    state.render("edit", json!({ "post": post }))
}

pub(super) async fn edit(State(state): State<AppState>, Form(form): Form<EditForm>) -> AppResult<Redirect> {
    let id = parse_post_id(&required(form.id, "id")?)?;
    let title = required(form.title, "title")?;
    let date = required(form.date, "date")?;
    let posts = state.posts.clone();
    if !blocking(move || Ok(posts.update(id, &title, &date)?)).await? {
        warn!(post_id = id, "edit matched no post");
    }
    Ok(Redirect::to("/list"))
}

/// Acknowledged only after the post is stored.
pub(super) async fn add(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<NewPostForm>,
) -> AppResult<&'static str> {
    let title = required(form.title, "title")?;
    let date = required(form.date, "date")?;
    let posts = state.posts.clone();
    let owner = user.id.clone();
    let post = blocking(move || Ok(posts.create(&owner, &title, &date)?)).await?;
    info!(post_id = post.id, user = %user.id, "post created");
    Ok("Saved to server.")
}

/// Deletes only a post the caller owns. A miss (unknown id or another user's post)
/// answers 404 instead of the confirmation.
pub(super) async fn delete_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<DeleteForm>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let id = parse_post_id(&required(form.id, "_id")?)?;
    let posts = state.posts.clone();
    let owner = user.id.clone();
    if blocking(move || Ok(posts.delete_owned(id, &owner)?)).await? {
        info!(post_id = id, user = %user.id, "post deleted");
        Ok((StatusCode::OK, Json(json!({ "message": "Deleted." }))))
    } else {
        Err(AppError::not_found("post_not_found", format!("no post {id} owned by {}", user.id)))
    }
}

pub(super) async fn search(State(state): State<AppState>, Query(q): Query<SearchQuery>) -> AppResult<Html<String>> {
    let key = q.key.unwrap_or_default();
    let posts = state.posts.search(&key)?;
    state.render("search", json!({ "posts": posts }))
}
