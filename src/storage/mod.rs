//!
//! board storage module
//! --------------------
//! The document-store seam used by every request handler. Handlers never touch a
//! concrete store; they receive a `SharedStore` (`Arc<dyn DocumentStore>`) through
//! the server state and speak in collections, filters and plain JSON documents.
//!
//! Key responsibilities:
//! - Collection-scoped find/insert/update/delete with equality filters.
//! - An atomic increment-and-read primitive used for sequential post ids.
//! - A word-level title search used by the search page.
//! - Opening a store from the `DB_URL` connection string.
//!
//! The bundled implementation is `MemoryStore`, optionally persisted to disk as one
//! JSON file per collection.
//!
//! Limits of the file-backed mode: every mutation reserializes and rewrites the whole
//! collection file with blocking I/O while holding the store's write lock, so a write
//! costs O(collection size) and serializes with every other write. The HTTP layer runs
//! mutations on the blocking pool (`server::blocking`); reads stay in memory.

use std::sync::Arc;

use thiserror::Error;

mod document;
mod memory;

pub use document::{Document, Filter, SearchHit, tokenize};
pub use memory::MemoryStore;

/// Collection names shared by the handlers.
pub mod collections {
    pub const LOGIN: &str = "login";
    pub const POST: &str = "post";
    pub const COUNTER: &str = "counter";
    pub const CHATROOM: &str = "chatroom";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed collection data: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("duplicate key {key} in collection {collection}")]
    DuplicateKey { collection: String, key: String },

    #[error("unsupported store connection string: {0}")]
    UnsupportedUrl(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Collection-scoped document storage.
///
/// Calls are synchronous and expected to be short; implementations guard their own
/// state and must be safe to share across request tasks.
pub trait DocumentStore: Send + Sync {
    /// First document matching `filter`, in insertion order.
    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>>;

    /// Every document matching `filter`, in insertion order.
    fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>>;

    /// Insert a document. A document carrying an `_id` equal to an existing one is
    /// rejected with `DuplicateKey`.
    fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<()>;

    /// Overwrite the fields in `set` on the first match. Returns the matched count (0 or 1).
    fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> StoreResult<u64>;

    /// Remove the first match. Returns the deleted count (0 or 1).
    fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Atomically add `by` to the integer `field` of the first match and return the new
    /// value. When nothing matches, a document built from the filter's fields is
    /// created with `field = by`.
    fn increment(&self, collection: &str, filter: &Filter, field: &str, by: i64) -> StoreResult<i64>;

    /// Word search over a string field. Hits are ordered by `_id` ascending and capped
    /// at `limit`.
    fn search_text(&self, collection: &str, field: &str, query: &str, limit: usize) -> StoreResult<Vec<SearchHit>>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

/// Open a store from a connection string.
///
/// Accepted forms: `memory:` (volatile), `file://<dir>` or `file:<dir>` (one JSON file
/// per collection under `<dir>`).
pub fn open(url: &str) -> StoreResult<SharedStore> {
    let url = url.trim();
    if url.is_empty() || url == "memory:" || url == "memory://" {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if let Some(path) = url.strip_prefix("file://").or_else(|| url.strip_prefix("file:")) {
        if path.is_empty() { return Err(StoreError::UnsupportedUrl(url.to_string())); }
        return Ok(Arc::new(MemoryStore::persistent(path)?));
    }
    Err(StoreError::UnsupportedUrl(url.to_string()))
}
