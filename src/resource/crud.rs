//! CRUD operations with lifecycle hooks
//!
//! Every operation resolves its [`ApiOptions`] against the module defaults,
//! runs the pre hook (unless disabled), talks to the store and finally
//! notifies the post hook observers.

use crate::core::error::{ApiError, ApiResult};
use crate::core::schema::{SanitiseOptions, ValidateOptions};
use crate::core::values::stringify_values;
use crate::core::{Document, Query};
use crate::resource::hooks::{InsertPayload, UpdatePayload};
use crate::resource::module::ApiModule;
use crate::storage::FindOptions;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Per-call options of the CRUD operations
///
/// Unset fields take the module defaults (see [`ApiOptions::with_defaults`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApiOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,

    /// Validate data (and parse queries) against the schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoke_pre_hook: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoke_post_hook: Option<bool>,

    /// Treat update data as a raw update document instead of a `$set`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_update: Option<bool>,

    /// `find_one` fails when nothing matches, unless set to `false`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl ApiOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema_name(mut self, name: impl Into<String>) -> Self {
        self.schema_name = Some(name.into());
        self
    }

    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = Some(validate);
        self
    }

    pub fn invoke_pre_hook(mut self, invoke: bool) -> Self {
        self.invoke_pre_hook = Some(invoke);
        self
    }

    pub fn invoke_post_hook(mut self, invoke: bool) -> Self {
        self.invoke_post_hook = Some(invoke);
        self
    }

    pub fn raw_update(mut self, raw: bool) -> Self {
        self.raw_update = Some(raw);
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    /// Fill unset fields from the module; explicit values are kept
    pub fn with_defaults(mut self, module: &ApiModule) -> Self {
        if self.schema_name.is_none() {
            self.schema_name = module.schema_name().map(str::to_string);
        }
        if self.collection_name.is_none() {
            self.collection_name = Some(module.collection_name().to_string());
        }
        self.validate.get_or_insert(true);
        self.invoke_pre_hook.get_or_insert(true);
        self.invoke_post_hook.get_or_insert(true);
        self
    }

    fn should_validate(&self) -> bool {
        self.validate != Some(false)
    }

    fn pre_hook(&self) -> bool {
        self.invoke_pre_hook != Some(false)
    }

    fn post_hook(&self) -> bool {
        self.invoke_post_hook != Some(false)
    }

    fn collection<'a>(&'a self, module: &'a ApiModule) -> &'a str {
        self.collection_name
            .as_deref()
            .unwrap_or(module.collection_name())
    }
}

/// Identifier reported by not-found errors: the `_id` if queried, else the
/// whole query
fn query_id(query: &Query) -> String {
    match query.get("_id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => Value::Object(query.clone()).to_string(),
    }
}

fn single(limit: usize) -> FindOptions {
    FindOptions {
        limit: Some(limit),
        ..Default::default()
    }
}

impl ApiModule {
    /// Validate data against a named schema
    pub async fn validate(
        &self,
        schema_name: Option<&str>,
        data: Document,
        options: &ValidateOptions,
    ) -> ApiResult<Document> {
        let Some(name) = schema_name else {
            return Err(ApiError::NoSchema { name: None });
        };
        let schema = self.get_schema(name, &data).await?;
        Ok(schema.validate(data, options)?)
    }

    /// Strip fields according to the schema; data passes through untouched
    /// when no schema name is known
    pub async fn sanitise(
        &self,
        schema_name: Option<&str>,
        data: Document,
        options: &SanitiseOptions,
    ) -> ApiResult<Document> {
        let Some(name) = schema_name else {
            return Ok(data);
        };
        let schema = self.get_schema(name, &data).await?;
        Ok(schema.sanitise(data, options)?)
    }

    /// Sanitise every document of a listing
    pub async fn sanitise_many(
        &self,
        schema_name: Option<&str>,
        data: Vec<Document>,
        options: &SanitiseOptions,
    ) -> ApiResult<Vec<Document>> {
        join_all(data.into_iter().map(|d| self.sanitise(schema_name, d, options)))
            .await
            .into_iter()
            .collect()
    }

    /// Insert a document
    pub async fn insert(&self, data: Document, options: ApiOptions) -> ApiResult<Document> {
        let mut options = options;
        if options.schema_name.is_none() {
            options.schema_name = self.resolve_schema_name(&data);
        }
        let options = options.with_defaults(self);

        let InsertPayload { data, options } = if options.pre_hook() && self.hooks.pre_insert.has_observers() {
            self.hooks.pre_insert.invoke(InsertPayload { data, options }).await?
        } else {
            InsertPayload { data, options }
        };

        let data = if options.should_validate() {
            self.validate(options.schema_name.as_deref(), data, &ValidateOptions::default())
                .await?
        } else {
            data
        };

        let store = self.store().await?;
        let inserted = store
            .insert(options.collection(self), data)
            .await
            .map_err(ApiError::storage)?;

        if options.post_hook() && self.hooks.post_insert.has_observers() {
            self.hooks.post_insert.invoke_all(Arc::new(inserted.clone())).await?;
        }
        Ok(inserted)
    }

    /// Find documents, through the module cache
    pub async fn find(&self, query: Query, options: ApiOptions, find_options: FindOptions) -> ApiResult<Vec<Document>> {
        let options = options.with_defaults(self);
        let query = if options.should_validate() {
            self.parse_query(options.schema_name.as_deref(), query).await
        } else {
            query
        };
        let store = self.store().await?;
        self.cache
            .get(store.as_ref(), options.collection(self), &query, &options, &find_options)
            .await
            .map_err(ApiError::storage)
    }

    /// Find exactly one document
    ///
    /// More than one match is an error. No match is an error too unless
    /// `strict` is `false`, in which case `None` is returned.
    pub async fn find_one(
        &self,
        query: Query,
        options: ApiOptions,
        find_options: FindOptions,
    ) -> ApiResult<Option<Document>> {
        let strict = options.strict != Some(false);
        let schema_name = options
            .schema_name
            .clone()
            .or_else(|| self.schema_name.clone());
        let mut results = self.find(query.clone(), options, find_options).await?;

        if results.len() > 1 {
            return Err(ApiError::TooManyResults {
                actual: results.len(),
                expected: 1,
                query: Value::Object(query),
            });
        }
        if results.is_empty() && strict {
            return Err(ApiError::not_found(query_id(&query), schema_name.as_deref()));
        }
        Ok(results.pop())
    }

    /// Update the first document matching `query`
    pub async fn update(&self, query: Query, data: Document, options: ApiOptions) -> ApiResult<Document> {
        let mut options = options;
        if options.schema_name.is_none() {
            options.schema_name = self.resolve_schema_name(&data);
        }
        let options = options.with_defaults(self);
        let store = self.store().await?;

        let original = store
            .find(options.collection(self), &query, &single(1))
            .await
            .map_err(ApiError::storage)?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::not_found(query_id(&query), options.schema_name.as_deref()))?;
        let original = Arc::new(original);

        let (mut update, changes) = split_update(data, options.raw_update == Some(true));

        let UpdatePayload { changes, options, .. } = if options.pre_hook() && self.hooks.pre_update.has_observers() {
            self.hooks
                .pre_update
                .invoke(UpdatePayload {
                    original: original.clone(),
                    changes,
                    options,
                })
                .await?
        } else {
            UpdatePayload {
                original: original.clone(),
                changes,
                options,
            }
        };

        let changes = if options.should_validate() {
            let mut merged = stringify_values(&original);
            merged.extend(changes);
            self.validate(options.schema_name.as_deref(), merged, &ValidateOptions::default())
                .await?
        } else {
            changes
        };
        update.insert("$set".to_string(), Value::Object(changes));

        let updated = store
            .update(options.collection(self), &query, &update)
            .await
            .map_err(ApiError::storage)?;

        if options.post_hook() && self.hooks.post_update.has_observers() {
            self.hooks
                .post_update
                .invoke_all((original, Arc::new(updated.clone())))
                .await?;
        }
        Ok(updated)
    }

    /// Update every document matching `query`
    ///
    /// Returns an empty list, without running hooks, when nothing matches.
    pub async fn update_many(
        &self,
        query: Query,
        data: Document,
        options: ApiOptions,
    ) -> ApiResult<Vec<Document>> {
        let mut options = options;
        if options.schema_name.is_none() {
            options.schema_name = self.resolve_schema_name(&data);
        }
        let options = options.with_defaults(self);
        let store = self.store().await?;

        let originals: Vec<Arc<Document>> = store
            .find(options.collection(self), &query, &FindOptions::default())
            .await
            .map_err(ApiError::storage)?
            .into_iter()
            .map(Arc::new)
            .collect();
        if originals.is_empty() {
            return Ok(Vec::new());
        }

        let (mut update, mut changes) = split_update(data, options.raw_update == Some(true));

        if options.pre_hook() && self.hooks.pre_update.has_observers() {
            let payloads = join_all(originals.iter().map(|original| {
                self.hooks.pre_update.invoke(UpdatePayload {
                    original: original.clone(),
                    changes: changes.clone(),
                    options: options.clone(),
                })
            }))
            .await;
            let mut merged = Document::new();
            for payload in payloads {
                merged.extend(payload?.changes);
            }
            changes = merged;
        }

        // a partial $set shared by every document, so required fields are not enforced
        let changes = if options.should_validate() {
            self.validate(options.schema_name.as_deref(), changes, &ValidateOptions::for_query())
                .await?
        } else {
            changes
        };
        update.insert("$set".to_string(), Value::Object(changes));

        let updated = store
            .update_many(options.collection(self), &query, &update)
            .await
            .map_err(ApiError::storage)?;

        if options.post_hook() && self.hooks.post_update.has_observers() {
            let notifications = updated.iter().enumerate().map(|(i, doc)| {
                let original = originals
                    .iter()
                    .find(|o| o.get("_id").is_some() && o.get("_id") == doc.get("_id"))
                    .or_else(|| originals.get(i))
                    .cloned()
                    .unwrap_or_else(|| Arc::new(Document::new()));
                self.hooks
                    .post_update
                    .invoke_all((original, Arc::new(doc.clone())))
            });
            join_all(notifications)
                .await
                .into_iter()
                .collect::<anyhow::Result<Vec<_>>>()?;
        }
        Ok(updated)
    }

    /// Delete the first document matching `query`, returning it
    pub async fn delete(&self, query: Query, options: ApiOptions) -> ApiResult<Document> {
        let options = options.with_defaults(self);
        let store = self.store().await?;

        let original = store
            .find(options.collection(self), &query, &single(1))
            .await
            .map_err(ApiError::storage)?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::not_found(query_id(&query), options.schema_name.as_deref()))?;
        let original = Arc::new(original);

        if options.pre_hook() && self.hooks.pre_delete.has_observers() {
            self.hooks.pre_delete.invoke_all(original.clone()).await?;
        }
        store
            .delete(options.collection(self), &query)
            .await
            .map_err(ApiError::storage)?;
        if options.post_hook() && self.hooks.post_delete.has_observers() {
            self.hooks.post_delete.invoke_all(original.clone()).await?;
        }
        Ok(Arc::unwrap_or_clone(original))
    }

    /// Delete every document matching `query`, returning them
    pub async fn delete_many(&self, query: Query, options: ApiOptions) -> ApiResult<Vec<Document>> {
        let options = options.with_defaults(self);
        let store = self.store().await?;

        let to_delete: Vec<Arc<Document>> = store
            .find(options.collection(self), &query, &FindOptions::default())
            .await
            .map_err(ApiError::storage)?
            .into_iter()
            .map(Arc::new)
            .collect();

        if options.pre_hook() && self.hooks.pre_delete.has_observers() {
            join_all(to_delete.iter().map(|d| self.hooks.pre_delete.invoke_all(d.clone())))
                .await
                .into_iter()
                .collect::<anyhow::Result<Vec<_>>>()?;
        }
        store
            .delete_many(options.collection(self), &query)
            .await
            .map_err(ApiError::storage)?;
        if options.post_hook() && self.hooks.post_delete.has_observers() {
            join_all(to_delete.iter().map(|d| self.hooks.post_delete.invoke_all(d.clone())))
                .await
                .into_iter()
                .collect::<anyhow::Result<Vec<_>>>()?;
        }
        Ok(to_delete.into_iter().map(Arc::unwrap_or_clone).collect())
    }
}

/// Split update data into the update document and its pending `$set`
///
/// Plain data becomes `{"$set": data}`. Raw data is used as the update
/// document itself, with any `$set` it carries pulled out.
fn split_update(data: Document, raw: bool) -> (Document, Document) {
    if !raw {
        return (Document::new(), data);
    }
    let mut update = data;
    let changes = match update.remove("$set") {
        Some(Value::Object(set)) => set,
        _ => Document::new(),
    };
    (update, changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validation::{BasicSchema, InMemorySchemaRegistry};
    use crate::resource::routes::default_routes;
    use crate::server::host::AppContext;
    use crate::storage::InMemoryDocumentStore;
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    fn module() -> ApiModule {
        let schemas = InMemorySchemaRegistry::new();
        schemas.register(
            BasicSchema::new(
                "log",
                json!({
                    "properties": {
                        "level": { "type": "string", "enum": ["info", "warn", "error"] },
                        "message": { "type": "string" },
                        "count": { "type": "number", "default": 0 }
                    },
                    "required": ["level"]
                }),
            )
            .unwrap(),
        );
        let context = AppContext::default()
            .with_store(InMemoryDocumentStore::new())
            .with_schemas(schemas);
        ApiModule::builder()
            .root("logs")
            .schema_name("log")
            .collection_name("logs")
            .routes(default_routes("logs"))
            .build(Arc::new(context))
            .unwrap()
    }

    #[test]
    fn test_with_defaults_keeps_explicit_values() {
        let module = module();
        let options = ApiOptions::new()
            .collection_name("other")
            .validate(false)
            .with_defaults(&module);
        assert_eq!(options.collection_name.as_deref(), Some("other"));
        assert_eq!(options.schema_name.as_deref(), Some("log"));
        assert_eq!(options.validate, Some(false));
        assert_eq!(options.invoke_pre_hook, Some(true));
        assert_eq!(options.strict, None);
    }

    #[tokio::test]
    async fn test_insert_validates_and_applies_defaults() {
        let module = module();
        let inserted = module
            .insert(doc(json!({"level": "info", "message": "hi"})), ApiOptions::new())
            .await
            .unwrap();
        assert!(inserted.contains_key("_id"));
        assert_eq!(inserted["count"], 0);

        let err = module
            .insert(doc(json!({"message": "no level"})), ApiOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn test_insert_hooks() {
        let module = module();
        module.hooks.pre_insert.tap(|mut payload: InsertPayload| async move {
            payload.data.insert("message".into(), json!("from hook"));
            Ok(payload)
        });
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        module.hooks.post_insert.tap(move |doc: Arc<Document>| {
            let counter = counter.clone();
            async move {
                assert_eq!(doc["message"], "from hook");
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let inserted = module
            .insert(doc(json!({"level": "info"})), ApiOptions::new())
            .await
            .unwrap();
        assert_eq!(inserted["message"], "from hook");
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        module
            .insert(
                doc(json!({"level": "info"})),
                ApiOptions::new().invoke_pre_hook(false).invoke_post_hook(false),
            )
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_post_hook_error_fails_operation() {
        let module = module();
        module
            .hooks
            .post_insert
            .tap(|_doc: Arc<Document>| async { Err(anyhow!("audit sink down")) });
        let err = module
            .insert(doc(json!({"level": "info"})), ApiOptions::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("audit sink down"));
    }

    #[tokio::test]
    async fn test_find_one_strictness() {
        let module = module();
        let q = doc(json!({"level": "warn"}));

        let err = module
            .find_one(q.clone(), ApiOptions::new(), FindOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");

        let none = module
            .find_one(q.clone(), ApiOptions::new().strict(false), FindOptions::default())
            .await
            .unwrap();
        assert!(none.is_none());

        for _ in 0..2 {
            module
                .insert(doc(json!({"level": "warn"})), ApiOptions::new())
                .await
                .unwrap();
        }
        match module.find_one(q, ApiOptions::new(), FindOptions::default()).await {
            Err(ApiError::TooManyResults { actual, expected, .. }) => {
                assert_eq!(actual, 2);
                assert_eq!(expected, 1);
            }
            other => panic!("expected too many results, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_merges_original_and_runs_hooks() {
        let module = module();
        let inserted = module
            .insert(doc(json!({"level": "info", "message": "a"})), ApiOptions::new())
            .await
            .unwrap();
        let id = inserted["_id"].clone();

        module.hooks.pre_update.tap(|mut payload: UpdatePayload| async move {
            assert_eq!(payload.original["message"], "a");
            payload.changes.insert("count".into(), json!(5));
            Ok(payload)
        });
        let originals = Arc::new(AtomicUsize::new(0));
        let counter = originals.clone();
        module
            .hooks
            .post_update
            .tap(move |(original, updated): (Arc<Document>, Arc<Document>)| {
                let counter = counter.clone();
                async move {
                    assert_eq!(original["message"], "a");
                    assert_eq!(updated["message"], "b");
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });

        let updated = module
            .update(
                doc(json!({"_id": id})),
                doc(json!({"message": "b"})),
                ApiOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(updated["level"], "info");
        assert_eq!(updated["message"], "b");
        assert_eq!(updated["count"], 5);
        assert_eq!(originals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let module = module();
        let err = module
            .update(doc(json!({"_id": "nope"})), doc(json!({"message": "x"})), ApiOptions::new())
            .await
            .unwrap_err();
        match err {
            ApiError::NotFound { id, schema } => {
                assert_eq!(id, "nope");
                assert_eq!(schema.as_deref(), Some("log"));
            }
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_raw_update() {
        let module = module();
        let inserted = module
            .insert(doc(json!({"level": "info", "count": 1})), ApiOptions::new())
            .await
            .unwrap();
        let updated = module
            .update(
                doc(json!({"_id": inserted["_id"].clone()})),
                doc(json!({"$inc": {"count": 2}})),
                ApiOptions::new().raw_update(true).validate(false),
            )
            .await
            .unwrap();
        assert_eq!(updated["count"], 3);
    }

    #[tokio::test]
    async fn test_update_many() {
        let module = module();
        let none = module
            .update_many(doc(json!({"level": "error"})), doc(json!({"message": "x"})), ApiOptions::new())
            .await
            .unwrap();
        assert!(none.is_empty());

        for message in ["a", "b"] {
            module
                .insert(doc(json!({"level": "error", "message": message})), ApiOptions::new())
                .await
                .unwrap();
        }
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        module.hooks.pre_update.tap(move |payload: UpdatePayload| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(payload)
            }
        });

        let updated = module
            .update_many(doc(json!({"level": "error"})), doc(json!({"message": "z"})), ApiOptions::new())
            .await
            .unwrap();
        assert_eq!(updated.len(), 2);
        assert!(updated.iter().all(|d| d["message"] == "z"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_delete_and_delete_many() {
        let module = module();
        let first = module
            .insert(doc(json!({"level": "info"})), ApiOptions::new())
            .await
            .unwrap();
        for _ in 0..2 {
            module
                .insert(doc(json!({"level": "warn"})), ApiOptions::new())
                .await
                .unwrap();
        }

        let deleted_count = Arc::new(AtomicUsize::new(0));
        let counter = deleted_count.clone();
        module.hooks.post_delete.tap(move |_doc: Arc<Document>| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let removed = module
            .delete(doc(json!({"_id": first["_id"].clone()})), ApiOptions::new())
            .await
            .unwrap();
        assert_eq!(removed["_id"], first["_id"]);

        let removed = module
            .delete_many(doc(json!({"level": "warn"})), ApiOptions::new())
            .await
            .unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(deleted_count.load(Ordering::SeqCst), 3);

        let err = module
            .delete(doc(json!({"_id": first["_id"].clone()})), ApiOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_validate_without_schema_name() {
        let module = module();
        let err = module
            .validate(None, Document::new(), &ValidateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NoSchema { name: None }));

        let data = doc(json!({"a": 1}));
        let out = module
            .sanitise(None, data.clone(), &SanitiseOptions::output())
            .await
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_split_update() {
        let (update, changes) = split_update(doc(json!({"a": 1})), false);
        assert!(update.is_empty());
        assert_eq!(changes, doc(json!({"a": 1})));

        let (update, changes) = split_update(doc(json!({"$set": {"a": 1}, "$inc": {"n": 1}})), true);
        assert_eq!(update, doc(json!({"$inc": {"n": 1}})));
        assert_eq!(changes, doc(json!({"a": 1})));
    }
}
