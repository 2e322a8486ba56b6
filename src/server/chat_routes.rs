use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Html;
use axum::Form;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::middleware_stages::AuthUser;
use super::{blocking, required, AppState};
use crate::error::AppResult;

#[derive(Debug, Deserialize)]
pub(super) struct RoomForm {
    title: Option<String>,
    #[serde(rename = "otherId", alias = "ohterId")]
    other_id: Option<String>,
}

pub(super) async fn create_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<RoomForm>,
) -> AppResult<&'static str> {
    let other = required(form.other_id, "otherId")?;
    let chats = state.chats.clone();
    let (me, with, title) = (user.id.clone(), other.clone(), form.title);
    let room = blocking(move || Ok(chats.create_room(&me, &with, title.as_deref())?)).await?;
    info!(user = %user.id, other = %other, title = %room.title, "chat room created");
    Ok("Entered the chat room.")
}

pub(super) async fn chat_page(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<Html<String>> {
    let rooms = state.chats.rooms_for(&user.id)?;
    state.render("chat", json!({ "data": rooms }))
}

/// One `test` event, then the stream stays open with periodic keep-alives.
pub(super) async fn events() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let first = stream::once(async { Ok::<_, Infallible>(Event::default().event("test").data("test")) });
    Sse::new(first.chain(stream::pending())).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
