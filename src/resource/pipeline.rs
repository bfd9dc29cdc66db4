//! Request pipeline
//!
//! Turns an HTTP request into a [`RequestContext`]: query string and path
//! parameters merge into one filter, the body is parsed, and the collection,
//! schema and modifying flag are resolved from the matched route. Modifying
//! requests then have their body sanitised against the schema.

use crate::core::auth::AuthContext;
use crate::core::context::RequestContext;
use crate::core::error::{ApiError, ApiResult};
use crate::core::schema::SanitiseOptions;
use crate::core::{Document, Query};
use crate::resource::module::ApiModule;
use crate::resource::routes::RouteDefinition;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, OriginalUri, RawPathParams, Request};
use axum::http::Method;
use serde_json::Value;
use std::sync::Arc;

/// The parts of an HTTP request the pipeline needs
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,

    /// Path and query as received, before any nesting was stripped
    pub original_uri: String,

    pub params: Vec<(String, String)>,

    pub query_pairs: Vec<(String, String)>,

    pub body: Option<Document>,

    pub auth: Arc<AuthContext>,
}

impl<S> FromRequest<S> for ApiRequest
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();

        let params = match RawPathParams::from_request_parts(&mut parts, state).await {
            Ok(params) => params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Err(_) => Vec::new(),
        };
        let query_pairs = axum::extract::Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map(|q| q.0)
            .unwrap_or_default();
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|o| o.0.clone())
            .unwrap_or_else(|| parts.uri.clone());
        let original_uri = uri
            .path_and_query()
            .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
        let auth = parts
            .extensions
            .get::<Arc<AuthContext>>()
            .cloned()
            .unwrap_or_else(|| Arc::new(AuthContext::Anonymous));
        let method = parts.method.clone();

        let bytes = Bytes::from_request(Request::from_parts(parts, body), state)
            .await
            .map_err(|e| ApiError::InvalidBody {
                message: e.body_text(),
            })?;

        Ok(Self {
            method,
            original_uri,
            params,
            query_pairs,
            body: parse_body(&bytes)?,
            auth,
        })
    }
}

/// Parse a JSON object body; an empty body is `None`
pub fn parse_body(bytes: &[u8]) -> ApiResult<Option<Document>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(ApiError::InvalidBody {
            message: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Build a filter map from query string pairs
///
/// Bracketed keys nest (`where[level]=info`), `key[]=v` appends to an
/// array, and a repeated key collects its values into an array.
pub fn parse_query_pairs(pairs: &[(String, String)]) -> Query {
    let mut query = Query::new();
    for (key, value) in pairs {
        let segments = key_segments(key);
        insert_pair(&mut query, &segments, value.clone());
    }
    query
}

fn key_segments(key: &str) -> Vec<&str> {
    let Some(open) = key.find('[') else {
        return vec![key];
    };
    if !key.ends_with(']') || open == 0 {
        return vec![key];
    }
    let mut segments = vec![&key[..open]];
    segments.extend(key[open + 1..key.len() - 1].split("]["));
    segments
}

fn insert_pair(target: &mut Document, segments: &[&str], value: String) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    match rest {
        [] => match target.get_mut(*head) {
            None => {
                target.insert(head.to_string(), Value::String(value));
            }
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, Value::String(value)]);
            }
        },
        [""] => {
            let entry = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match entry {
                Value::Array(items) => items.push(Value::String(value)),
                other => {
                    let previous = other.take();
                    *other = Value::Array(vec![previous, Value::String(value)]);
                }
            }
        }
        _ => {
            let entry = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(nested) = entry {
                insert_pair(nested, rest, value);
            }
        }
    }
}

impl ApiModule {
    /// Derive the request context for a matched route
    ///
    /// Path parameters override query string keys of the same name. The
    /// collection comes from the route when it overrides the module's.
    pub fn process_request(&self, route: &RouteDefinition, request: ApiRequest) -> RequestContext {
        let mut query = parse_query_pairs(&request.query_pairs);
        for (key, value) in &request.params {
            query.insert(key.clone(), Value::String(value.clone()));
        }
        let data = request.body.unwrap_or_default();

        let collection_name = route
            .collection_name
            .clone()
            .unwrap_or_else(|| self.collection_name.clone());

        let mut merged = query.clone();
        merged.extend(data.clone());
        let schema_name = self.resolve_schema_name(&merged);

        RequestContext {
            modifying: route.is_modifying(&request.method),
            validate: route.validate,
            method: request.method,
            route: route.route.clone(),
            original_uri: request.original_uri,
            collection_name,
            schema_name,
            query,
            query_pairs: request.query_pairs,
            params: request.params,
            data,
            auth: request.auth,
        }
    }

    /// Sanitise the body of a modifying request
    ///
    /// The `_id` from the filter is carried into the body, replacing any
    /// `_id` the body names, and read-only fields are stripped.
    pub async fn sanitise_request_data(&self, ctx: &mut RequestContext) -> ApiResult<()> {
        if !ctx.modifying {
            return Ok(());
        }
        let mut data = std::mem::take(&mut ctx.data);
        if let Some(id) = ctx.query.get("_id") {
            data.insert("_id".into(), id.clone());
        }

        ctx.data = self
            .sanitise(ctx.schema_name.as_deref(), data, &SanitiseOptions::read_only())
            .await?;
        Ok(())
    }
}
