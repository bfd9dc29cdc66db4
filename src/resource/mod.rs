//! Resource modules: collections exposed as REST resources
//!
//! An [`ApiModule`] ties a collection and a schema to a set of routes. It
//! owns its [`ApiHooks`], its read cache, and the CRUD, query and access
//! operations the route handlers call.

pub mod access;
pub mod crud;
pub mod handlers;
pub mod hooks;
pub mod metadata;
pub mod module;
pub mod pipeline;
pub mod query;
pub mod routes;

pub use crud::ApiOptions;
pub use hooks::{AccessRequest, ApiHooks, InsertPayload, UpdatePayload};
pub use metadata::generate_api_metadata;
pub use module::{ApiModule, ApiModuleBuilder, ModuleSchemaName, SchemaNameResolver};
pub use pipeline::ApiRequest;
pub use query::extract_storage_options;
pub use routes::{
    DbFunction, RouteDefinition, RouteHandler, default_routes, http_method_to_action, http_method_to_db_function,
    map_status_code,
};
