//! Query engine: storage options, search, query parsing and pagination
//!
//! Listings go through [`ApiModule::handle_query`]:
//!
//! 1. storage options (`collation`, `limit`, `page`, `skip`, `sort`) are
//!    lifted out of the filter
//! 2. `search` becomes a case-insensitive match on the searchable fields
//! 3. the filter is parsed against the schema
//! 4. pagination headers are computed from the match count
//! 5. results are access-filtered, and the page is refilled from later
//!    batches when filtering left it short

use crate::core::context::RequestContext;
use crate::core::error::{ApiError, ApiResult};
use crate::core::query::PageState;
use crate::core::schema::{SanitiseOptions, ValidateOptions};
use crate::core::{Document, Query};
use crate::resource::crud::ApiOptions;
use crate::resource::module::ApiModule;
use crate::storage::FindOptions;
use axum::Json;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

/// Filter keys that are storage options rather than document fields
pub const STORAGE_OPTION_KEYS: [&str; 5] = ["collation", "limit", "page", "skip", "sort"];

/// Filter key holding a free-text search term
pub const SEARCH_KEY: &str = "search";

/// Remove the storage options from a filter
///
/// String values are parsed as JSON (query strings carry `sort={"a":1}`).
/// Values that fail to parse, or have the wrong shape, are logged and
/// dropped.
pub fn extract_storage_options(query: &mut Query) -> FindOptions {
    let mut options = FindOptions::default();

    for key in STORAGE_OPTION_KEYS {
        let Some(raw) = query.remove(key) else {
            continue;
        };
        let value = match raw {
            Value::String(s) => match serde_json::from_str::<Value>(&s) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("failed to parse query {} param '{}', {}", key, s, e);
                    continue;
                }
            },
            other => other,
        };

        let applied = match key {
            "collation" => {
                options.collation = Some(value.clone());
                true
            }
            "sort" => {
                options.sort = Some(value.clone());
                true
            }
            "limit" => value.as_u64().map(|n| options.limit = Some(n as usize)).is_some(),
            "skip" => value.as_u64().map(|n| options.skip = Some(n as usize)).is_some(),
            "page" => value.as_i64().map(|n| options.page = Some(n)).is_some(),
            _ => false,
        };
        if !applied {
            tracing::warn!("ignoring query {} param '{}'", key, value);
        }
    }
    options
}

/// Combine search conditions with a filter
///
/// An existing `$or` cannot be widened, so both disjunctions move under
/// `$and` (appending to one that is already there).
fn merge_search(query: &mut Query, conditions: Vec<Value>) {
    let search = json!({ "$or": conditions });
    match query.remove("$or") {
        Some(existing) => {
            let mut clauses = match query.remove("$and") {
                Some(Value::Array(clauses)) => clauses,
                Some(other) => vec![other],
                None => Vec::new(),
            };
            clauses.push(json!({ "$or": existing }));
            clauses.push(search);
            query.insert("$and".into(), Value::Array(clauses));
        }
        None => {
            query.insert("$or".into(), search["$or"].clone());
        }
    }
}

impl ApiModule {
    /// Turn a `search` term into a case-insensitive match on every
    /// searchable field
    ///
    /// The term is escaped, so it always matches literally. Failures are
    /// logged and leave the filter without the search.
    pub async fn apply_search(&self, schema_name: Option<&str>, query: &mut Query) {
        let Some(search) = query.remove(SEARCH_KEY) else {
            return;
        };
        let term = match &search {
            Value::String(s) if s.is_empty() => return,
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => {
                tracing::warn!("failed to process search parameter, unsupported value {}", other);
                return;
            }
        };
        let Some(name) = schema_name else {
            tracing::warn!("failed to process search parameter, no schema configured");
            return;
        };
        let fields = match self.get_schema(name, query).await {
            Ok(schema) => schema.searchable_fields(),
            Err(e) => {
                tracing::warn!("failed to process search parameter, {}", e);
                return;
            }
        };
        if fields.is_empty() {
            return;
        }

        let pattern = json!({ "$regex": regex::escape(&term), "$options": "i" });
        let conditions = fields
            .into_iter()
            .map(|field| json!({ field: pattern.clone() }))
            .collect();
        merge_search(query, conditions);
    }

    /// Coerce a filter through the schema
    ///
    /// Required fields are not enforced and defaults are not applied.
    /// `$or` branches are parsed independently; anything that fails to
    /// parse is kept as given.
    pub async fn parse_query(&self, schema_name: Option<&str>, query: Query) -> Query {
        let Some(name) = schema_name else {
            return query;
        };
        let schema = match self.get_schema(name, &query).await {
            Ok(schema) => schema,
            Err(e) => {
                tracing::debug!("query left unparsed: {}", e);
                return query;
            }
        };
        let options = ValidateOptions::for_query();

        if let Some(Value::Array(branches)) = query.get("$or") {
            let parsed = branches
                .iter()
                .map(|branch| match branch {
                    Value::Object(expr) => schema
                        .validate(expr.clone(), &options)
                        .map(Value::Object)
                        .unwrap_or_else(|_| branch.clone()),
                    other => other.clone(),
                })
                .collect();
            let mut query = query;
            query.insert("$or".into(), Value::Array(parsed));
            return query;
        }

        match schema.validate(query.clone(), &options) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("query left unparsed: {}", e);
                query
            }
        }
    }

    /// Count the matches and fix `limit`/`skip` for the requested page
    pub async fn set_up_pagination(&self, ctx: &RequestContext, find_options: &mut FindOptions) -> ApiResult<PageState> {
        let store = self.store().await?;
        let count = store
            .count(&ctx.collection_name, &ctx.query)
            .await
            .map_err(ApiError::storage)?;

        let state = PageState::new(
            find_options.limit,
            find_options.page,
            find_options.skip.filter(|skip| *skip > 0),
            count,
            self.default_page_size,
            self.max_page_size,
        );
        find_options.limit = Some(state.page_size);
        find_options.skip = Some(state.skip);
        Ok(state)
    }

    /// Paginated listing
    ///
    /// The filter is the query string, merged with the body for `POST`
    /// (body keys win).
    pub async fn handle_query(&self, ctx: RequestContext) -> ApiResult<Response> {
        let mut ctx = ctx;
        let mut filter = ctx.query.clone();
        if ctx.method == Method::POST {
            filter.extend(ctx.data.clone());
        }
        let mut find_options = extract_storage_options(&mut filter);
        self.apply_search(ctx.schema_name.as_deref(), &mut filter).await;
        ctx.query = self.parse_query(ctx.schema_name.as_deref(), filter).await;

        let ctx = self.hooks.request.invoke(ctx).await?;

        let state = self.set_up_pagination(&ctx, &mut find_options).await?;

        let mut options = ApiOptions::new()
            .collection_name(ctx.collection_name.clone())
            .validate(ctx.validate);
        options.schema_name = ctx.schema_name.clone();

        let fetched = self
            .find(ctx.query.clone(), options.clone(), find_options.clone())
            .await?;
        let full_batch = fetched.len() == state.page_size;
        let mut results = self.check_access_many(&ctx.auth, fetched).await;

        if full_batch && results.len() < state.page_size {
            results = self
                .backfill(&ctx, results, &options, &find_options, state.skip + state.page_size)
                .await?;
        }

        let results = self
            .sanitise_many(ctx.schema_name.as_deref(), results, &SanitiseOptions::output())
            .await?;

        let mut response = Json(results).into_response();
        state.apply_headers(response.headers_mut(), &ctx.original_uri);
        Ok(response)
    }

    /// Refill a page that access filtering left short
    ///
    /// Fetches page-sized batches from `next_skip` onwards until the page is
    /// full, the store runs dry, or `max_backfill_batches` is reached.
    async fn backfill(
        &self,
        ctx: &RequestContext,
        mut results: Vec<Document>,
        options: &ApiOptions,
        find_options: &FindOptions,
        next_skip: usize,
    ) -> ApiResult<Vec<Document>> {
        let page_size = find_options.limit.unwrap_or(self.default_page_size);
        let max_batches = self.context.config.max_backfill_batches;
        let mut skip = next_skip;
        let mut batches = 0;

        while results.len() < page_size {
            if max_batches.is_some_and(|max| batches >= max) {
                tracing::debug!("backfill stopped after {} batches", batches);
                break;
            }
            let extra = self
                .find(ctx.query.clone(), options.clone(), find_options.with_skip(skip))
                .await?;
            if extra.is_empty() {
                break;
            }
            skip += extra.len();
            batches += 1;
            results.extend(self.check_access_many(&ctx.auth, extra).await);
        }
        results.truncate(page_size);
        Ok(results)
    }
}
