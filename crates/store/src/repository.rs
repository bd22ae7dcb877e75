//! Typed repository over one collection of a [`DocumentStore`].

use std::marker::PhantomData;
use std::sync::Arc;

use twinchat_common::{AppResult, Region};

use crate::document::{Document, DocumentStore, Query, from_document, to_document};
use crate::models::Record;

/// Typed CRUD over the collection of `T`.
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Repository<T> {
    /// Create a new repository.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    /// Region of the underlying store.
    #[must_use]
    pub fn region(&self) -> Region {
        self.store.region()
    }

    /// Find a record by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<T>> {
        self.store
            .get(T::COLLECTION, id)
            .await?
            .map(from_document)
            .transpose()
    }

    /// Find records matching a query.
    pub async fn find(&self, query: &Query) -> AppResult<Vec<T>> {
        self.store
            .query(T::COLLECTION, query)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    /// Find the first record matching a query.
    pub async fn find_one(&self, query: Query) -> AppResult<Option<T>> {
        Ok(self.find(&query.limit(1)).await?.into_iter().next())
    }

    /// Insert a new record.
    pub async fn create(&self, record: &T) -> AppResult<T> {
        let doc = to_document(record)?;
        from_document(self.store.insert(T::COLLECTION, doc).await?)
    }

    /// Merge a patch into a record.
    pub async fn update(&self, id: &str, patch: Document) -> AppResult<Option<T>> {
        self.store
            .update(T::COLLECTION, id, patch)
            .await?
            .map(from_document)
            .transpose()
    }

    /// Atomically add `delta` to an integer field.
    pub async fn increment(&self, id: &str, field: &str, delta: i64) -> AppResult<Option<T>> {
        self.store
            .increment(T::COLLECTION, id, field, delta)
            .await?
            .map(from_document)
            .transpose()
    }

    /// Delete a record.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        self.store.delete(T::COLLECTION, id).await
    }
}
