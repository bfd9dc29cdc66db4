//! Per-request derived state

use crate::core::auth::AuthContext;
use crate::core::{Document, Query};
use axum::http::Method;
use std::sync::Arc;

/// State derived from one request, owned by that request
///
/// Built by the request pipeline and handed explicitly to handlers and hooks.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,

    /// Route pattern the request matched, e.g. `/:_id`
    pub route: String,

    /// Path and query string as received, used for pagination links
    pub original_uri: String,

    /// Collection the request reads from or writes to
    pub collection_name: String,

    /// Schema used for validation and sanitisation
    pub schema_name: Option<String>,

    /// Query string and path parameters merged; path parameters win
    pub query: Query,

    /// Raw query string pairs, in request order
    pub query_pairs: Vec<(String, String)>,

    /// Path parameters alone
    pub params: Vec<(String, String)>,

    /// Parsed JSON body (empty when absent)
    pub data: Document,

    /// Whether the request writes data
    pub modifying: bool,

    /// Whether request data should be validated
    pub validate: bool,

    pub auth: Arc<AuthContext>,
}

impl RequestContext {
    /// Path without the query string
    pub fn path(&self) -> &str {
        self.original_uri
            .split_once('?')
            .map_or(self.original_uri.as_str(), |(path, _)| path)
    }

    /// Value of a path parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Caller id for audit logging
    pub fn caller(&self) -> &str {
        self.auth.user_id().unwrap_or("anonymous")
    }
}
