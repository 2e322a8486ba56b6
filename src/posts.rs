//!
//! board posts
//! -----------
//! Post records and the operations the handlers run on them. Post ids come from the
//! `counter` collection through the store's atomic increment, so two concurrent
//! creations never share an id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::storage::{collections, Document, DocumentStore, Filter, SharedStore, StoreResult};

/// `name` of the counter record tracking the number of posts ever created.
pub const COUNTER_NAME: &str = "postCount";
/// Integer field on the counter record.
pub const COUNTER_FIELD: &str = "totalPost";
/// Maximum number of search results.
pub const SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: i64,
    /// Identifier of the owning user.
    pub user: String,
    pub title: String,
    pub date: String,
}

impl Post {
    fn from_document(doc: Document) -> StoreResult<Self> {
        Ok(serde_json::from_value(Value::Object(doc))?)
    }

    fn to_document(&self) -> StoreResult<Document> {
        match serde_json::to_value(self)? {
            Value::Object(m) => Ok(m),
            _ => Ok(Document::new()),
        }
    }
}

/// Search projection: the matching title and its relevance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub score: f64,
}

#[derive(Clone)]
pub struct PostRepository {
    store: SharedStore,
}

fn counter_filter() -> Filter { Filter::by("name", COUNTER_NAME) }

impl PostRepository {
    pub fn new(store: SharedStore) -> Self { Self { store } }

    /// Create the counter record at zero if it does not exist yet.
    pub fn ensure_counter(&self) -> StoreResult<()> {
        if self.store.find_one(collections::COUNTER, &counter_filter())?.is_none() {
            let mut doc = Document::new();
            doc.insert("name".into(), Value::from(COUNTER_NAME));
            doc.insert(COUNTER_FIELD.into(), Value::from(0));
            self.store.insert_one(collections::COUNTER, doc)?;
            info!("initialised post counter");
        }
        Ok(())
    }

    /// Current counter value (0 when the record is absent).
    pub fn counter(&self) -> StoreResult<i64> {
        Ok(self
            .store
            .find_one(collections::COUNTER, &counter_filter())?
            .and_then(|d| d.get(COUNTER_FIELD).and_then(|v| v.as_i64()))
            .unwrap_or(0))
    }

    pub fn list(&self) -> StoreResult<Vec<Post>> {
        self.store
            .find(collections::POST, &Filter::all())?
            .into_iter()
            .map(Post::from_document)
            .collect()
    }

    pub fn get(&self, id: i64) -> StoreResult<Option<Post>> {
        self.store
            .find_one(collections::POST, &Filter::by("_id", id))?
            .map(Post::from_document)
            .transpose()
    }

    /// Assign the next id (counter + 1) and insert the post. Returns once the post is stored.
    ///
    /// If the insert fails after the increment, that id is skipped; ids stay unique.
    pub fn create(&self, owner: &str, title: &str, date: &str) -> StoreResult<Post> {
        let id = self.store.increment(collections::COUNTER, &counter_filter(), COUNTER_FIELD, 1)?;
        let post = Post { id, user: owner.to_string(), title: title.to_string(), date: date.to_string() };
        self.store.insert_one(collections::POST, post.to_document()?)?;
        debug!(post_id = id, user = owner, "post stored");
        Ok(post)
    }

    /// Set title and date on post `id`. Returns false when no such post exists.
    pub fn update(&self, id: i64, title: &str, date: &str) -> StoreResult<bool> {
        let mut set = Document::new();
        set.insert("title".into(), Value::from(title));
        set.insert("date".into(), Value::from(date));
        Ok(self.store.update_one(collections::POST, &Filter::by("_id", id), set)? > 0)
    }

    /// Delete post `id` only if `owner` owns it. Returns whether anything was deleted.
    pub fn delete_owned(&self, id: i64, owner: &str) -> StoreResult<bool> {
        let filter = Filter::by("_id", id).and("user", owner);
        Ok(self.store.delete_one(collections::POST, &filter)? > 0)
    }

    /// Title search, ordered by post id, at most `SEARCH_LIMIT` results.
    pub fn search(&self, key: &str) -> StoreResult<Vec<SearchResult>> {
        let hits = self.store.search_text(collections::POST, "title", key, SEARCH_LIMIT)?;
        Ok(hits
            .into_iter()
            .map(|h| SearchResult {
                title: h.document.get("title").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                score: h.score,
            })
            .collect())
    }
}
