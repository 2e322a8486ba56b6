use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use super::document::{tokenize, Document, Filter, SearchHit};
use super::{DocumentStore, StoreError, StoreResult};

fn sanitize_filename(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

fn id_key(doc: &Document) -> i64 {
    doc.get("_id").and_then(|v| v.as_i64()).unwrap_or(i64::MAX)
}

/// In-process document store.
///
/// Collections live in a single `RwLock`ed map. With a backing directory, every
/// mutation rewrites `<dir>/<collection>.json` before the new state becomes visible,
/// so a failed write leaves both memory and disk at the previous state.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    dir: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { collections: RwLock::new(HashMap::new()), dir: None }
    }

    /// Open (or create) a directory-backed store and load every `*.json` collection in it.
    pub fn persistent(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let mut map: HashMap<String, Vec<Document>> = HashMap::new();
        for entry in std::fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") { continue; }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else { continue; };
            let bytes = std::fs::read(&path)?;
            let docs: Vec<Document> = serde_json::from_slice(&bytes)?;
            debug!(collection = name, count = docs.len(), "loaded collection");
            map.insert(name.to_string(), docs);
        }
        info!(dir = %dir.display(), collections = map.len(), "opened file-backed document store");
        Ok(Self { collections: RwLock::new(map), dir: Some(dir) })
    }

    fn collection_path(dir: &Path, collection: &str) -> PathBuf {
        dir.join(format!("{}.json", sanitize_filename(collection)))
    }

    fn write_collection(dir: &Path, collection: &str, docs: &[Document]) -> StoreResult<()> {
        let path = Self::collection_path(dir, collection);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(docs)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Run `f` against a copy of the collection under the write lock, persist the copy,
    /// then publish it.
    fn mutate<T>(&self, collection: &str, f: impl FnOnce(&mut Vec<Document>) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.collections.write();
        let mut next = guard.get(collection).cloned().unwrap_or_default();
        let out = f(&mut next)?;
        if let Some(dir) = &self.dir {
            Self::write_collection(dir, collection, &next)?;
        }
        guard.insert(collection.to_string(), next);
        Ok(out)
    }
}

impl DocumentStore for MemoryStore {
    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let guard = self.collections.read();
        Ok(guard.get(collection).and_then(|docs| docs.iter().find(|d| filter.matches(d)).cloned()))
    }

    fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        let guard = self.collections.read();
        Ok(guard
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default())
    }

    fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<()> {
        self.mutate(collection, |docs| {
            if let Some(id) = doc.get("_id") {
                if docs.iter().any(|d| d.get("_id") == Some(id)) {
                    return Err(StoreError::DuplicateKey { collection: collection.to_string(), key: id.to_string() });
                }
            }
            docs.push(doc);
            Ok(())
        })
    }

    fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> StoreResult<u64> {
        self.mutate(collection, |docs| {
            let Some(doc) = docs.iter_mut().find(|d| filter.matches(d)) else { return Ok(0); };
            for (k, v) in set { doc.insert(k, v); }
            Ok(1)
        })
    }

    fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.mutate(collection, |docs| {
            match docs.iter().position(|d| filter.matches(d)) {
                Some(i) => { docs.remove(i); Ok(1) }
                None => Ok(0),
            }
        })
    }

    fn increment(&self, collection: &str, filter: &Filter, field: &str, by: i64) -> StoreResult<i64> {
        self.mutate(collection, |docs| {
            if let Some(doc) = docs.iter_mut().find(|d| filter.matches(d)) {
                let next = doc.get(field).and_then(|v| v.as_i64()).unwrap_or(0) + by;
                doc.insert(field.to_string(), Value::from(next));
                return Ok(next);
            }
            let mut doc = Document::new();
            for (k, v) in filter.fields() { doc.insert(k.to_string(), v.clone()); }
            doc.insert(field.to_string(), Value::from(by));
            docs.push(doc);
            Ok(by)
        })
    }

    fn search_text(&self, collection: &str, field: &str, query: &str, limit: usize) -> StoreResult<Vec<SearchHit>> {
        let terms = tokenize(query);
        if terms.is_empty() || limit == 0 { return Ok(Vec::new()); }
        let guard = self.collections.read();
        let Some(docs) = guard.get(collection) else { return Ok(Vec::new()); };
        let mut hits: Vec<SearchHit> = docs
            .iter()
            .filter_map(|d| {
                let text = d.get(field)?.as_str()?;
                let words = tokenize(text);
                let found = terms.iter().filter(|t| words.contains(t)).count();
                if found == 0 { return None; }
                Some(SearchHit { document: d.clone(), score: found as f64 / terms.len() as f64 })
            })
            .collect();
        hits.sort_by_key(|h| id_key(&h.document));
        hits.truncate(limit);
        Ok(hits)
    }
}
