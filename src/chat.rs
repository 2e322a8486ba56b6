//! Chat rooms between two members, stored in the `chatroom` collection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::{collections, DocumentStore, Filter, SharedStore, StoreError, StoreResult};

pub const DEFAULT_ROOM_TITLE: &str = "chatRoomTitle";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub title: String,
    pub member: Vec<String>,
    /// RFC 3339 creation time.
    pub date: String,
}

#[derive(Clone)]
pub struct ChatRepository {
    store: SharedStore,
}

impl ChatRepository {
    pub fn new(store: SharedStore) -> Self { Self { store } }

    pub fn create_room(&self, me: &str, other: &str, title: Option<&str>) -> StoreResult<ChatRoom> {
        let title = title.map(str::trim).filter(|t| !t.is_empty()).unwrap_or(DEFAULT_ROOM_TITLE);
        let room = ChatRoom {
            title: title.to_string(),
            member: vec![me.to_string(), other.to_string()],
            date: chrono::Utc::now().to_rfc3339(),
        };
        if let Value::Object(doc) = serde_json::to_value(&room)? {
            self.store.insert_one(collections::CHATROOM, doc)?;
        }
        Ok(room)
    }

    /// Rooms that list `me` as a member.
    pub fn rooms_for(&self, me: &str) -> StoreResult<Vec<ChatRoom>> {
        self.store
            .find(collections::CHATROOM, &Filter::by("member", me))?
            .into_iter()
            .map(|d| serde_json::from_value(Value::Object(d)).map_err(StoreError::from))
            .collect()
    }
}
