//! Log API example
//!
//! A capped `logs` collection exposed read-only: a paginated listing, a
//! fetch by id and a POST query route.
//!
//! ```text
//! curl -i -H 'x-user-id: ops' -H 'x-scopes: read:logs' \
//!     'http://127.0.0.1:3000/api/logs?level=error&limit=10&page=1'
//! ```

use docrest::prelude::*;
use tracing_subscriber::EnvFilter;

fn log_schema() -> Value {
    json!({
        "properties": {
            "level": { "type": "string", "enum": ["debug", "info", "warn", "error"], "isSearchable": true },
            "message": { "type": "string", "isSearchable": true },
            "timestamp": { "type": "string" },
            "host": { "type": "string", "isInternal": true }
        },
        "required": ["level", "message"]
    })
}

fn log_routes() -> Vec<RouteDefinition> {
    vec![
        RouteDefinition::new("/")
            .handler(Method::GET, RouteHandler::Query)
            .permissions(Method::GET, ["read:logs"]),
        RouteDefinition::new("/:_id")
            .handler(Method::GET, RouteHandler::Default)
            .permissions(Method::GET, ["read:logs"]),
        RouteDefinition::new("/query")
            .validate(false)
            .modifying(false)
            .handler(Method::POST, RouteHandler::Query)
            .permissions(Method::POST, ["read:logs"]),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,docrest=debug")))
        .init();

    let store = InMemoryDocumentStore::new();
    store.create_collection(
        "logs",
        CollectionOptions {
            capped: true,
            max: Some(1000),
            size: Some(1000 * 1000),
        },
    )?;
    for (level, message) in [
        ("info", "service started"),
        ("warn", "slow response from upstream"),
        ("error", "upstream unavailable"),
    ] {
        store
            .insert(
                "logs",
                json!({
                    "level": level,
                    "message": message,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "host": "node-1"
                })
                .as_object()
                .cloned()
                .unwrap_or_default(),
            )
            .await?;
    }

    let schemas = InMemorySchemaRegistry::new().with_schemas([("log".to_string(), log_schema())])?;

    println!("Log API on http://127.0.0.1:3000");
    println!("  GET  /api/logs          read:logs");
    println!("  GET  /api/logs/:_id     read:logs");
    println!("  POST /api/logs/query    read:logs");

    ServerBuilder::new()
        .with_store(store)
        .with_schemas(schemas)
        .with_auth_provider(HeaderAuthProvider)
        .register_module(
            ApiModule::builder()
                .root("logs")
                .schema_name("log")
                .collection_name("logs")
                .enable_cache(true)
                .routes(log_routes()),
        )?
        .serve("127.0.0.1:3000")
        .await
}
