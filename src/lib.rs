//! # docrest
//!
//! A framework for exposing document-store collections as REST resources.
//!
//! ## Features
//!
//! - **Resource Modules**: one collection, one schema, a set of routes
//! - **Default CRUD Routes**: insert, fetch, replace, update, delete and query
//! - **Lifecycle Hooks**: mutable pre hooks, concurrent post hooks
//! - **Pagination**: page headers and RFC 5988 `Link` relations
//! - **Record Access Control**: pluggable checks with page backfill
//! - **Read Cache**: time-limited, pruned lazily
//! - **Declarative Configuration**: modules and routes from YAML or JSON
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docrest::prelude::*;
//!
//! let schemas = InMemorySchemaRegistry::new()
//!     .with_schemas([("log".to_string(), json!({
//!         "properties": { "level": { "type": "string", "isSearchable": true } },
//!         "required": ["level"]
//!     }))])?;
//!
//! let app = ServerBuilder::new()
//!     .with_store(InMemoryDocumentStore::new())
//!     .with_schemas(schemas)
//!     .with_auth_provider(HeaderAuthProvider)
//!     .register_module(
//!         ApiModule::builder()
//!             .root("logs")
//!             .schema_name("log")
//!             .collection_name("logs")
//!             .use_default_routes(true),
//!     )?
//!     .build()?;
//! ```

pub mod config;
pub mod core;
pub mod resource;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        AuthContext, AuthProvider, DataCache, Document, HeaderAuthProvider, MutableHook, NoAuthProvider,
        ObserverHook, PageState, Query, RequestContext,
        error::{ApiError, ApiResult, ConfigError},
        schema::{FieldError, SanitiseOptions, Schema, SchemaError, SchemaProvider, ValidateOptions},
        validation::{BasicSchema, InMemorySchemaRegistry},
        values::stringify_values,
    };

    // === Resources ===
    pub use crate::resource::{
        AccessRequest, ApiHooks, ApiModule, ApiModuleBuilder, ApiOptions, InsertPayload, RouteDefinition,
        RouteHandler, SchemaNameResolver, UpdatePayload, default_routes, map_status_code,
    };

    // === Storage ===
    pub use crate::storage::{CollectionOptions, DocumentStore, FindOptions, InMemoryDocumentStore};

    // === Config ===
    pub use crate::config::{ApiConfig, ModuleConfig, RouteConfig};

    // === Server ===
    pub use crate::server::{AppContext, ServerBuilder};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};

    // === Axum ===
    pub use axum::{Router, http::Method};
}
