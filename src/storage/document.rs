use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// A stored document: a JSON object.
pub type Document = serde_json::Map<String, Value>;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("word pattern"));

/// Lowercased word tokens of `text`, deduplicated, in first-seen order.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in WORD.find_iter(text) {
        let w = m.as_str().to_lowercase();
        if !out.contains(&w) { out.push(w); }
    }
    out
}

/// Conjunction of field equality tests.
///
/// A test against an array field matches when the array contains the value, so
/// `Filter::by("member", "alice")` selects every chat room alice belongs to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Vec<(String, Value)>);

impl Filter {
    /// Matches every document.
    pub fn all() -> Self { Self(Vec::new()) }

    pub fn by(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self(vec![(field.into(), value.into())])
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((field.into(), value.into()));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.0.iter().all(|(field, want)| match doc.get(field) {
            Some(Value::Array(items)) if !want.is_array() => items.contains(want),
            Some(have) => have == want,
            None => want.is_null(),
        })
    }
}

/// One search result with its relevance in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub document: Document,
    pub score: f64,
}
