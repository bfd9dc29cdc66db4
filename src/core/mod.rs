//! Core module containing fundamental traits and types for the framework

pub mod auth;
pub mod cache;
pub mod context;
pub mod error;
pub mod hook;
pub mod query;
pub mod schema;
pub mod validation;
pub mod values;

/// A stored document: a JSON object keyed by field name
pub type Document = serde_json::Map<String, serde_json::Value>;

/// A storage filter, using the same shape as a document
pub type Query = Document;

pub use auth::{AuthContext, AuthProvider, HeaderAuthProvider, NoAuthProvider};
pub use cache::DataCache;
pub use context::RequestContext;
pub use error::{ApiError, ApiResult, ConfigError};
pub use hook::{MutableHook, ObserverHook};
pub use query::PageState;
pub use schema::{SanitiseOptions, Schema, SchemaError, SchemaProvider, ValidateOptions};
pub use validation::{BasicSchema, InMemorySchemaRegistry};
