//! In-process driver for development and tests.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;
use twinchat_common::{AppError, AppResult, Region};

use crate::document::{Direction, Document, DocumentStore, Query, compare_values, document_id};

type Collections = HashMap<String, BTreeMap<String, Document>>;

/// Document store kept in memory. Every operation is atomic per call.
#[derive(Debug)]
pub struct MemoryStore {
    region: Region,
    collections: RwLock<Collections>,
}

impl MemoryStore {
    /// Create an empty store for a region.
    #[must_use]
    pub fn new(region: Region) -> Self {
        Self {
            region,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> AppResult<usize> {
        Ok(self.read()?.get(collection).map_or(0, BTreeMap::len))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn region(&self) -> Region {
        self.region
    }

    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>> {
        Ok(self
            .read()?
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn query(&self, collection: &str, query: &Query) -> AppResult<Vec<Document>> {
        let guard = self.read()?;
        let Some(docs) = guard.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<Document> = docs
            .values()
            .filter(|doc| query.matches(doc))
            .cloned()
            .collect();

        if let Some(order) = &query.order {
            matched.sort_by(|a, b| {
                let a = a.get(&order.field).unwrap_or(&Value::Null);
                let b = b.get(&order.field).unwrap_or(&Value::Null);
                let ordering = compare_values(a, b).unwrap_or(Ordering::Equal);
                match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            matched.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        Ok(matched)
    }

    async fn insert(&self, collection: &str, doc: Document) -> AppResult<Document> {
        let id = document_id(&doc)?.to_string();
        let mut guard = self.write()?;
        let docs = guard.entry(collection.to_string()).or_default();
        if docs.contains_key(&id) {
            return Err(AppError::Conflict(format!(
                "duplicate id {id} in {collection}"
            )));
        }
        docs.insert(id, doc.clone());
        Ok(doc)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> AppResult<Option<Document>> {
        let mut guard = self.write()?;
        let Some(doc) = guard.get_mut(collection).and_then(|docs| docs.get_mut(id)) else {
            return Ok(None);
        };
        for (key, value) in patch {
            if key != "id" {
                doc.insert(key, value);
            }
        }
        Ok(Some(doc.clone()))
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> AppResult<Option<Document>> {
        let mut guard = self.write()?;
        let Some(doc) = guard.get_mut(collection).and_then(|docs| docs.get_mut(id)) else {
            return Ok(None);
        };
        let current = doc.get(field).and_then(Value::as_i64).unwrap_or(0);
        doc.insert(field.to_string(), Value::from(current + delta));
        Ok(Some(doc.clone()))
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool> {
        Ok(self
            .write()?
            .get_mut(collection)
            .is_some_and(|docs| docs.remove(id).is_some()))
    }
}
