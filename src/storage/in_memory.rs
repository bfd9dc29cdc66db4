//! In-memory implementation of DocumentStore for testing and development

use super::filter::{apply_update, matches, sort_documents};
use super::{DocumentStore, FindOptions};
use crate::core::{Document, Query};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Options used when creating a collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionOptions {
    /// Evict the oldest documents once `max` or `size` is exceeded
    #[serde(default)]
    pub capped: bool,

    /// Document count bound
    #[serde(default)]
    pub max: Option<usize>,

    /// Soft bound on the serialised size of the collection, in bytes
    ///
    /// The newest document is always kept, even when it alone is larger.
    #[serde(default)]
    pub size: Option<usize>,
}

#[derive(Debug, Default)]
struct Collection {
    options: CollectionOptions,
    docs: Vec<Document>,
}

impl Collection {
    fn enforce_cap(&mut self) {
        if !self.options.capped {
            return;
        }
        if let Some(max) = self.options.max {
            let excess = self.docs.len().saturating_sub(max);
            self.docs.drain(..excess);
        }
        if let Some(size) = self.options.size {
            let mut total: usize = self.docs.iter().map(encoded_len).sum();
            let mut excess = 0;
            while total > size && excess + 1 < self.docs.len() {
                total -= encoded_len(&self.docs[excess]);
                excess += 1;
            }
            self.docs.drain(..excess);
        }
    }

    fn matching(&self, query: &Query) -> Result<Vec<usize>> {
        let mut indices = Vec::new();
        for (i, doc) in self.docs.iter().enumerate() {
            if matches(doc, query)? {
                indices.push(i);
            }
        }
        Ok(indices)
    }
}

fn encoded_len(doc: &Document) -> usize {
    serde_json::to_vec(doc).map(|bytes| bytes.len()).unwrap_or(0)
}

/// In-memory document store implementation
///
/// Useful for testing and development. Uses RwLock for thread-safe access.
/// Collections are created on first insert unless created explicitly with
/// [`create_collection`](Self::create_collection).
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryDocumentStore {
    /// Create a new in-memory document store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection with explicit options
    ///
    /// Fails if the collection already exists.
    pub fn create_collection(&self, name: &str, options: CollectionOptions) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        if collections.contains_key(name) {
            bail!("Collection '{}' already exists", name);
        }
        collections.insert(
            name.to_string(),
            Collection {
                options,
                docs: Vec::new(),
            },
        );
        Ok(())
    }

    /// Options of an existing collection
    pub fn collection_options(&self, name: &str) -> Option<CollectionOptions> {
        let collections = self.collections.read().ok()?;
        collections.get(name).map(|c| c.options.clone())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find(&self, collection: &str, query: &Query, options: &FindOptions) -> Result<Vec<Document>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut docs = coll
            .matching(query)?
            .into_iter()
            .map(|i| coll.docs[i].clone())
            .collect::<Vec<_>>();

        if let Some(sort) = &options.sort {
            sort_documents(&mut docs, sort)?;
        }
        let skip = options.skip.unwrap_or(0);
        let limit = options.limit.unwrap_or(usize::MAX);

        Ok(docs.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, collection: &str, query: &Query) -> Result<usize> {
        let collections = self
            .collections
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        match collections.get(collection) {
            Some(coll) => Ok(coll.matching(query)?.len()),
            None => Ok(0),
        }
    }

    async fn insert(&self, collection: &str, mut data: Document) -> Result<Document> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let id_missing = data.get("_id").is_none_or(Value::is_null);
        if id_missing {
            data.insert("_id".into(), Value::String(Uuid::new_v4().to_string()));
        }

        let coll = collections.entry(collection.to_string()).or_default();
        if !id_missing && coll.docs.iter().any(|d| d.get("_id") == data.get("_id")) {
            bail!("Duplicate _id in collection '{}'", collection);
        }
        coll.docs.push(data.clone());
        coll.enforce_cap();

        Ok(data)
    }

    async fn update(&self, collection: &str, query: &Query, update: &Document) -> Result<Document> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| anyhow!("No document in '{}' matches the query", collection))?;
        let index = *coll
            .matching(query)?
            .first()
            .ok_or_else(|| anyhow!("No document in '{}' matches the query", collection))?;

        let updated = apply_update(&coll.docs[index], update)?;
        coll.docs[index] = updated.clone();

        Ok(updated)
    }

    async fn update_many(&self, collection: &str, query: &Query, update: &Document) -> Result<Vec<Document>> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let Some(coll) = collections.get_mut(collection) else {
            return Ok(Vec::new());
        };
        let mut updated = Vec::new();
        for index in coll.matching(query)? {
            let doc = apply_update(&coll.docs[index], update)?;
            coll.docs[index] = doc.clone();
            updated.push(doc);
        }

        Ok(updated)
    }

    async fn delete(&self, collection: &str, query: &Query) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        if let Some(coll) = collections.get_mut(collection) {
            if let Some(&index) = coll.matching(query)?.first() {
                coll.docs.remove(index);
            }
        }

        Ok(())
    }

    async fn delete_many(&self, collection: &str, query: &Query) -> Result<usize> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let Some(coll) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let doomed = coll.matching(query)?;
        let mut index = 0;
        coll.docs.retain(|_| {
            let keep = !doomed.contains(&index);
            index += 1;
            keep
        });

        Ok(doomed.len())
    }
}
