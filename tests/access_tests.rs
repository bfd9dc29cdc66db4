//! Route permissions and record-level access checks

mod common;

use axum::http::StatusCode;
use common::*;
use docrest::core::query::PAGE_TOTAL_HEADER;
use docrest::prelude::*;
use std::sync::Arc;

fn names(body: &Value) -> Vec<String> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|d| d["message"].as_str().unwrap().to_string())
        .collect()
}

/// Six records, of which the even ones are visible
async fn visible_evens(builder: ServerBuilder, store: &InMemoryDocumentStore) -> (axum_test::TestServer, Arc<ApiModule>) {
    let (server, module) = mount(builder, logs_module());
    module.hooks.access_check.tap(|req: AccessRequest| async move {
        Ok(req.record.get("visible") == Some(&Value::Bool(true)))
    });
    seed(
        store,
        (0..6).map(|i| json!({"level": "info", "message": format!("m{}", i), "visible": i % 2 == 0})),
    )
    .await;
    (server, module)
}

#[tokio::test]
async fn test_anonymous_is_unauthorized() {
    let (server, _) = mount(server_builder(InMemoryDocumentStore::new()), logs_module());

    let response = server.get("/api/logs").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_scope_is_forbidden() {
    let (server, _) = mount(server_builder(InMemoryDocumentStore::new()), logs_module());

    let response = as_user(server.post("/api/logs"), "bob", "read:logs")
        .json(&json!({"level": "info", "message": "m"}))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["code"], "FORBIDDEN");
    assert_eq!(body["details"]["missing"], json!(["write:logs"]));
}

#[tokio::test]
async fn test_super_bypasses_scopes() {
    let (server, _) = mount(server_builder(InMemoryDocumentStore::new()), logs_module());

    let response = as_super(server.post("/api/logs"))
        .json(&json!({"level": "info", "message": "m"}))
        .await;

    response.assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn test_unrestricted_route_is_open() {
    let module = ApiModule::builder()
        .root("public")
        .schema_name("log")
        .collection_name("logs")
        .route(RouteDefinition::new("/").handler(Method::GET, RouteHandler::Query));
    let (server, _) = mount(server_builder(InMemoryDocumentStore::new()), module);

    server.get("/api/public").await.assert_status_ok();
}

#[tokio::test]
async fn test_open_access_without_checks() {
    let store = InMemoryDocumentStore::new();
    let (server, _) = mount(server_builder(store.clone()), logs_module());
    seed(&store, (0..3).map(|i| json!({"level": "info", "message": format!("m{}", i)}))).await;

    let body: Value = as_admin(server.get("/api/logs")).await.json();

    assert_eq!(names(&body), vec!["m0", "m1", "m2"]);
}

#[tokio::test]
async fn test_reject_all_gives_empty_listing() {
    let store = InMemoryDocumentStore::new();
    let (server, module) = mount(server_builder(store.clone()), logs_module());
    module.hooks.access_check.tap(|_req: AccessRequest| async move { Ok(false) });
    seed(&store, (0..3).map(|i| json!({"level": "info", "message": format!("m{}", i)}))).await;

    let response = as_admin(server.get("/api/logs")).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_failing_check_hides_record() {
    let store = InMemoryDocumentStore::new();
    let (server, module) = mount(server_builder(store.clone()), logs_module());
    module
        .hooks
        .access_check
        .tap(|_req: AccessRequest| async move { Err(anyhow::anyhow!("acl service down")) });
    seed(&store, [json!({"level": "info", "message": "m"})]).await;

    let response = as_admin(server.get("/api/logs")).await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!([]));
}

#[tokio::test]
async fn test_any_passing_check_grants_access() {
    let store = InMemoryDocumentStore::new();
    let (server, module) = mount(server_builder(store.clone()), logs_module());
    module.hooks.access_check.tap(|_req: AccessRequest| async move { Ok(false) });
    module.hooks.access_check.tap(|req: AccessRequest| async move {
        Ok(req.caller.user_id() == Some("alice"))
    });
    seed(&store, [json!({"level": "info", "message": "m"})]).await;

    let body: Value = as_admin(server.get("/api/logs")).await.json();

    assert_eq!(names(&body), vec!["m"]);
}

#[tokio::test]
async fn test_super_bypasses_access_checks() {
    let store = InMemoryDocumentStore::new();
    let (server, module) = mount(server_builder(store.clone()), logs_module());
    module.hooks.access_check.tap(|_req: AccessRequest| async move { Ok(false) });
    seed(&store, [json!({"level": "info", "message": "m"})]).await;

    let body: Value = as_super(server.get("/api/logs")).await.json();

    assert_eq!(names(&body), vec!["m"]);
}

#[tokio::test]
async fn test_hidden_record_by_id_is_not_found() {
    let store = InMemoryDocumentStore::new();
    let (server, _) = visible_evens(server_builder(store.clone()), &store).await;
    let all = store.find("logs", &Query::new(), &FindOptions::default()).await.unwrap();
    let hidden = all[1]["_id"].as_str().unwrap();
    let shown = all[0]["_id"].as_str().unwrap();

    as_admin(server.get(&format!("/api/logs/{}", hidden)))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    as_admin(server.get(&format!("/api/logs/{}", shown)))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_rejected_update_is_unauthorized() {
    let store = InMemoryDocumentStore::new();
    let (server, module) = mount(server_builder(store.clone()), logs_module());
    module.hooks.access_check.tap(|_req: AccessRequest| async move { Ok(false) });
    let ids = seed(&store, [json!({"level": "info", "message": "m"})]).await;

    let response = as_admin(server.patch(&format!("/api/logs/{}", ids[0])))
        .json(&json!({"message": "changed"}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "UNAUTHORISED");
    let stored = store.find("logs", &Query::new(), &FindOptions::default()).await.unwrap();
    assert_eq!(stored[0]["message"], "m");
}

#[tokio::test]
async fn test_writes_are_checked_against_stored_record() {
    let store = InMemoryDocumentStore::new();
    let (server, _) = visible_evens(server_builder(store.clone()), &store).await;
    let all = store.find("logs", &Query::new(), &FindOptions::default()).await.unwrap();
    let shown = all[0]["_id"].as_str().unwrap().to_string();
    let hidden = all[1]["_id"].as_str().unwrap().to_string();

    let response = as_admin(server.patch(&format!("/api/logs/{}", shown)))
        .json(&json!({"message": "edited"}))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["message"], "edited");

    as_admin(server.patch(&format!("/api/logs/{}", hidden)))
        .json(&json!({"message": "edited"}))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    as_admin(server.delete(&format!("/api/logs/{}", hidden)))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    as_admin(server.delete(&format!("/api/logs/{}", shown)))
        .await
        .assert_status(StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_failing_check_blocks_write() {
    let store = InMemoryDocumentStore::new();
    let (server, module) = mount(server_builder(store.clone()), logs_module());
    module
        .hooks
        .access_check
        .tap(|_req: AccessRequest| async move { anyhow::bail!("directory unavailable") });
    let ids = seed(&store, [json!({"level": "info", "message": "m"})]).await;

    as_admin(server.put(&format!("/api/logs/{}", ids[0])))
        .json(&json!({"message": "changed"}))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_write_to_missing_record_is_not_found() {
    let store = InMemoryDocumentStore::new();
    let (server, _) = visible_evens(server_builder(store.clone()), &store).await;

    as_admin(server.patch("/api/logs/missing"))
        .json(&json!({"message": "edited"}))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_backfill_refills_page() {
    let store = InMemoryDocumentStore::new();
    let (server, _) = visible_evens(server_builder(store.clone()), &store).await;

    let response = as_admin(server.get("/api/logs"))
        .add_query_param("limit", 2)
        .add_query_param("page", 1)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(names(&body), vec!["m0", "m2"]);
    assert_eq!(header(&response, PAGE_TOTAL_HEADER).as_deref(), Some("3"));
}

#[tokio::test]
async fn test_backfill_stops_when_store_runs_dry() {
    let store = InMemoryDocumentStore::new();
    let (server, _) = visible_evens(server_builder(store.clone()), &store).await;

    let body: Value = as_admin(server.get("/api/logs"))
        .add_query_param("limit", 4)
        .await
        .json();

    assert_eq!(names(&body), vec!["m0", "m2", "m4"]);
}

#[tokio::test]
async fn test_backfill_batch_limit() {
    let store = InMemoryDocumentStore::new();
    let builder = ServerBuilder::with_config(ApiConfig {
        max_backfill_batches: Some(0),
        ..Default::default()
    })
    .with_store(store.clone())
    .with_schemas(schemas())
    .with_auth_provider(HeaderAuthProvider);
    let (server, _) = visible_evens(builder, &store).await;

    let body: Value = as_admin(server.get("/api/logs"))
        .add_query_param("limit", 2)
        .await
        .json();

    assert_eq!(names(&body), vec!["m0"]);
}
