//! Storage contract and the in-memory reference store
//!
//! The framework talks to a document store through [`DocumentStore`] only.
//! Queries and updates use a Mongo-flavoured JSON shape (`$or`, `$gt`,
//! `$regex`, `$set` ...), which is what the query engine produces.

pub mod filter;
pub mod in_memory;

use crate::core::{Document, Query};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use filter::QueryError;
pub use in_memory::{CollectionOptions, InMemoryDocumentStore};

/// Storage-level options for a read
///
/// Unset fields are skipped when serialised so that equal options always
/// produce equal cache keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    /// Sort specification, e.g. `{"timestamp": -1}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,

    /// Requested page, consumed by pagination and ignored by stores
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,

    /// Opaque collation passed through to the store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collation: Option<Value>,
}

impl FindOptions {
    /// Copy of these options reading from a different offset
    pub fn with_skip(&self, skip: usize) -> Self {
        Self {
            skip: Some(skip),
            ..self.clone()
        }
    }

    pub fn with_limit(&self, limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..self.clone()
        }
    }
}

/// Document store collaborator
///
/// `update` and `delete` act on the first matching document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find documents matching a query
    async fn find(&self, collection: &str, query: &Query, options: &FindOptions) -> Result<Vec<Document>>;

    /// Count documents matching a query
    async fn count(&self, collection: &str, query: &Query) -> Result<usize>;

    /// Insert a document, returning it as stored (with `_id`)
    async fn insert(&self, collection: &str, data: Document) -> Result<Document>;

    /// Apply an update document to the first match and return the result
    async fn update(&self, collection: &str, query: &Query, update: &Document) -> Result<Document>;

    /// Apply an update document to every match and return the results
    async fn update_many(&self, collection: &str, query: &Query, update: &Document) -> Result<Vec<Document>>;

    /// Delete the first match
    async fn delete(&self, collection: &str, query: &Query) -> Result<()>;

    /// Delete every match, returning how many were removed
    async fn delete_many(&self, collection: &str, query: &Query) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_options_serialisation_is_stable() {
        let opts = FindOptions {
            limit: Some(10),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&opts).unwrap(), r#"{"limit":10}"#);
        assert_eq!(serde_json::to_string(&FindOptions::default()).unwrap(), "{}");
    }

    #[test]
    fn test_with_skip_keeps_other_options() {
        let opts = FindOptions {
            sort: Some(json!({"timestamp": -1})),
            limit: Some(5),
            skip: Some(0),
            ..Default::default()
        };
        let next = opts.with_skip(5);
        assert_eq!(next.skip, Some(5));
        assert_eq!(next.limit, Some(5));
        assert_eq!(next.sort, opts.sort);
    }
}
