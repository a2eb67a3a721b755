use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// A fully-resolved, read-only query against one collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreQuery {
    pub db: String,
    pub collection: String,
    /// Equality filter document; `None` matches everything.
    pub filter: Option<Value>,
    /// Sort document mapping field names to `1` (ascending) or `-1`.
    pub sort: Option<Value>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    /// First-level field names requested by the GraphQL selection set; an
    /// empty projection returns whole documents.
    pub projection: Vec<String>,
}

/// Transport or server failure reported by the document store.
#[derive(Clone, Debug, Error)]
#[error("document store error: {reason}")]
pub struct StoreError {
    pub reason: String,
}

impl StoreError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Leaf I/O seam to the document database.
///
/// Implementations are read-only from this crate's perspective; any retry
/// policy lives below this trait.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find at most one document matching the query.
    async fn find_one(&self, query: &StoreQuery) -> Result<Option<Value>, StoreError>;

    /// Find all documents matching the query, in sort order.
    async fn find_many(&self, query: &StoreQuery) -> Result<Vec<Value>, StoreError>;
}

/// An in-process [`DocumentStore`] holding collections in memory.
///
/// Used by the test suites and as an embedded store for demos; it supports
/// top-level equality filters, multi-key sorts, skip/limit and projection.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<(String, String), Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of `db`.`collection`.
    pub fn insert_collection(&self, db: &str, collection: &str, documents: Vec<Value>) {
        self.collections
            .write()
            .expect("collection lock poisoned")
            .insert((db.to_string(), collection.to_string()), documents);
    }

    fn select(&self, query: &StoreQuery) -> Vec<Value> {
        let collections = self.collections.read().expect("collection lock poisoned");
        let documents = match collections.get(&(query.db.clone(), query.collection.clone())) {
            Some(documents) => documents,
            None => return Vec::new(),
        };
        let mut matched: Vec<Value> = documents
            .iter()
            .filter(|doc| matches_filter(doc, query.filter.as_ref()))
            .cloned()
            .collect();
        if let Some(Value::Object(sort)) = &query.sort {
            // later sort keys break ties of earlier ones
            for (field, direction) in sort.iter().collect::<Vec<_>>().into_iter().rev() {
                let descending = direction.as_i64() == Some(-1);
                matched.sort_by(|a, b| {
                    let ordering = compare_values(a.get(field), b.get(field));
                    if descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                });
            }
        }
        let skip = query.skip.unwrap_or(0) as usize;
        let mut matched: Vec<Value> = matched.into_iter().skip(skip).collect();
        if let Some(limit) = query.limit {
            matched.truncate(limit as usize);
        }
        if !query.projection.is_empty() {
            for doc in &mut matched {
                if let Value::Object(map) = doc {
                    map.retain(|key, _| query.projection.iter().any(|field| field == key));
                }
            }
        }
        matched
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(&self, query: &StoreQuery) -> Result<Option<Value>, StoreError> {
        Ok(self.select(query).into_iter().next())
    }

    async fn find_many(&self, query: &StoreQuery) -> Result<Vec<Value>, StoreError> {
        Ok(self.select(query))
    }
}

fn matches_filter(doc: &Value, filter: Option<&Value>) -> bool {
    match filter {
        None => true,
        Some(Value::Object(filter)) => filter
            .iter()
            .all(|(key, expected)| doc.get(key) == Some(expected)),
        Some(_) => false,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_collection(
            "d",
            "books",
            vec![
                json!({"title": "B", "authorId": "42", "year": 2001}),
                json!({"title": "A", "authorId": "42", "year": 1999}),
                json!({"title": "C", "authorId": "7", "year": 2010}),
            ],
        );
        store
    }

    #[tokio::test]
    async fn filters_on_equality() {
        let results = store()
            .find_many(&StoreQuery {
                db: "d".to_string(),
                collection: "books".to_string(),
                filter: Some(json!({"authorId": "42"})),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn sorts_skips_and_limits() {
        let results = store()
            .find_many(&StoreQuery {
                db: "d".to_string(),
                collection: "books".to_string(),
                sort: Some(json!({"year": -1})),
                skip: Some(1),
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results[0]["title"], json!("B"));
    }

    #[tokio::test]
    async fn projects_selected_fields() {
        let result = store()
            .find_one(&StoreQuery {
                db: "d".to_string(),
                collection: "books".to_string(),
                filter: Some(json!({"title": "A"})),
                projection: vec!["title".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result, Some(json!({"title": "A"})));
    }

    #[tokio::test]
    async fn unknown_collection_is_empty() {
        let results = store()
            .find_many(&StoreQuery {
                db: "d".to_string(),
                collection: "missing".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
