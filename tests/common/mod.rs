//! Shared fixtures for the integration tests

#![allow(dead_code)]

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use docrest::prelude::*;
use std::sync::Arc;

pub fn log_schema() -> Value {
    json!({
        "properties": {
            "level": { "type": "string", "enum": ["debug", "info", "warn", "error"], "isSearchable": true },
            "message": { "type": "string", "isSearchable": true },
            "count": { "type": "integer", "default": 0 },
            "created_by": { "type": "string", "isReadOnly": true },
            "host": { "type": "string", "isInternal": true },
            "visible": { "type": "boolean" }
        },
        "required": ["level", "message"]
    })
}

pub fn schemas() -> InMemorySchemaRegistry {
    InMemorySchemaRegistry::new()
        .with_schemas([("log".to_string(), log_schema())])
        .unwrap()
}

/// A server builder with a fresh store, the `log` schema and header auth
pub fn server_builder(store: InMemoryDocumentStore) -> ServerBuilder {
    ServerBuilder::new()
        .with_store(store)
        .with_schemas(schemas())
        .with_auth_provider(HeaderAuthProvider)
}

/// The `logs` resource with the default routes
pub fn logs_module() -> ApiModuleBuilder {
    ApiModule::builder()
        .root("logs")
        .schema_name("log")
        .collection_name("logs")
        .use_default_routes(true)
}

/// Build the module against the builder's context and keep a handle on it
pub fn mount(builder: ServerBuilder, module: ApiModuleBuilder) -> (TestServer, Arc<ApiModule>) {
    let module = Arc::new(module.build(builder.context().clone()).unwrap());
    let app = builder.register_api_module(module.clone()).build().unwrap();
    (TestServer::try_new(app).unwrap(), module)
}

pub async fn seed(store: &InMemoryDocumentStore, docs: impl IntoIterator<Item = Value>) -> Vec<String> {
    let mut ids = Vec::new();
    for doc in docs {
        let inserted = store
            .insert("logs", doc.as_object().cloned().unwrap())
            .await
            .unwrap();
        ids.push(inserted["_id"].as_str().unwrap().to_string());
    }
    ids
}

/// Authenticate a request as a user holding `scopes`
pub fn as_user(request: TestRequest, user: &'static str, scopes: &'static str) -> TestRequest {
    request
        .add_header(HeaderName::from_static("x-user-id"), HeaderValue::from_static(user))
        .add_header(HeaderName::from_static("x-scopes"), HeaderValue::from_static(scopes))
}

/// A user allowed to read and write logs and read schemas
pub fn as_admin(request: TestRequest) -> TestRequest {
    as_user(request, "alice", "read:logs write:logs read:schema")
}

pub fn as_super(request: TestRequest) -> TestRequest {
    request
        .add_header(HeaderName::from_static("x-user-id"), HeaderValue::from_static("root"))
        .add_header(HeaderName::from_static("x-super"), HeaderValue::from_static("true"))
}

pub fn header(response: &axum_test::TestResponse, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
