//! Route definitions and HTTP verb mappings

use crate::config::{HandlerKind, RouteConfig};
use crate::core::context::RequestContext;
use crate::core::error::{ApiResult, ConfigError};
use crate::resource::ApiModule;
use axum::http::{Method, StatusCode};
use axum::response::Response;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Handler signature for application-defined routes
pub type CustomHandler =
    Arc<dyn Fn(Arc<ApiModule>, RequestContext) -> BoxFuture<'static, ApiResult<Response>> + Send + Sync>;

/// What serves a verb on a route
#[derive(Clone)]
pub enum RouteHandler {
    /// Generic CRUD handler (insert/find/update/delete by verb)
    Default,
    /// Paginated listing
    Query,
    /// Serves the schema document
    Schema,
    /// Application handler, run after the request pipeline
    Custom(CustomHandler),
}

impl RouteHandler {
    /// Wrap an async function as a custom handler
    pub fn custom<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<ApiModule>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Response>> + Send + 'static,
    {
        RouteHandler::Custom(Arc::new(move |module, ctx| Box::pin(f(module, ctx))))
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteHandler::Default => write!(f, "Default"),
            RouteHandler::Query => write!(f, "Query"),
            RouteHandler::Schema => write!(f, "Schema"),
            RouteHandler::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl From<HandlerKind> for RouteHandler {
    fn from(kind: HandlerKind) -> Self {
        match kind {
            HandlerKind::Default => RouteHandler::Default,
            HandlerKind::Query => RouteHandler::Query,
            HandlerKind::Schema => RouteHandler::Schema,
        }
    }
}

/// Verbs that modify data unless a route says otherwise
pub const DEFAULT_MODIFIERS: [Method; 4] = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

/// One route of a resource module
///
/// # Example
///
/// ```rust,ignore
/// let route = RouteDefinition::new("/query")
///     .handler(Method::POST, RouteHandler::Query)
///     .permissions(Method::POST, ["read:logs"])
///     .validate(false)
///     .modifying(false);
/// ```
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    /// Path pattern relative to the module root (`/`, `/:_id`, `/:_id?`)
    pub route: String,

    pub handlers: IndexMap<Method, RouteHandler>,

    /// Scopes required per verb
    pub permissions: IndexMap<Method, Vec<String>>,

    /// Explicit modifying flag for every verb of the route
    pub modifying: Option<bool>,

    /// Verbs considered modifying when `modifying` is unset
    pub modifiers: Option<Vec<Method>>,

    /// Whether request data is validated
    pub validate: bool,

    /// Collection override for this route
    pub collection_name: Option<String>,

    /// API documentation per verb
    pub meta: IndexMap<Method, Value>,
}

impl RouteDefinition {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            handlers: IndexMap::new(),
            permissions: IndexMap::new(),
            modifying: None,
            modifiers: None,
            validate: true,
            collection_name: None,
            meta: IndexMap::new(),
        }
    }

    pub fn handler(mut self, method: Method, handler: RouteHandler) -> Self {
        self.handlers.insert(method, handler);
        self
    }

    pub fn permissions<I, S>(mut self, method: Method, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .insert(method, scopes.into_iter().map(Into::into).collect());
        self
    }

    pub fn modifying(mut self, modifying: bool) -> Self {
        self.modifying = Some(modifying);
        self
    }

    pub fn modifiers(mut self, modifiers: Vec<Method>) -> Self {
        self.modifiers = Some(modifiers);
        self
    }

    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    /// Whether a request with this verb modifies data
    pub fn is_modifying(&self, method: &Method) -> bool {
        self.modifying.unwrap_or_else(|| match &self.modifiers {
            Some(modifiers) => modifiers.contains(method),
            None => DEFAULT_MODIFIERS.contains(method),
        })
    }

    /// Scopes required for a verb (empty when unrestricted)
    pub fn scopes_for(&self, method: &Method) -> &[String] {
        self.permissions.get(method).map_or(&[], Vec::as_slice)
    }

    /// Build a route from its declarative form, expanding `${scope}`
    pub fn from_config(config: &RouteConfig, scope: &str) -> Result<Self, ConfigError> {
        let mut route = RouteDefinition::new(config.route.clone());
        for (verb, kind) in &config.handlers {
            route.handlers.insert(parse_method(verb)?, (*kind).into());
        }
        for (verb, scopes) in config.expanded_permissions(scope) {
            route.permissions.insert(parse_method(&verb)?, scopes);
        }
        route.modifying = config.modifying;
        route.modifiers = config
            .modifiers
            .as_ref()
            .map(|verbs| verbs.iter().map(|v| parse_method(v)).collect::<Result<Vec<_>, _>>())
            .transpose()?;
        route.validate = config.validate.unwrap_or(true);
        route.collection_name = config.collection_name.clone();
        Ok(route)
    }

    /// Axum path patterns for this route
    ///
    /// `:name` becomes `{name}`. A trailing optional segment (`/:_id?`)
    /// yields two patterns, with and without the segment.
    pub fn axum_paths(&self) -> Vec<String> {
        let segments: Vec<&str> = self.route.split('/').filter(|s| !s.is_empty()).collect();
        let convert = |segs: &[&str]| {
            let path = segs
                .iter()
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => format!("{{{}}}", name.trim_end_matches('?')),
                    None => s.to_string(),
                })
                .collect::<Vec<_>>()
                .join("/");
            format!("/{}", path)
        };

        match segments.split_last() {
            Some((last, rest)) if last.starts_with(':') && last.ends_with('?') => {
                vec![convert(rest), convert(&segments)]
            }
            _ => vec![convert(&segments)],
        }
    }
}

fn parse_method(verb: &str) -> Result<Method, ConfigError> {
    Method::from_bytes(verb.to_uppercase().as_bytes()).map_err(|e| ConfigError::InvalidValue {
        field: "handlers".into(),
        value: verb.to_string(),
        message: e.to_string(),
    })
}

/// The standard CRUD route set
///
/// - `/`: POST (write) and GET (paginated listing, read)
/// - `/schema`: GET (`read:schema`)
/// - `/:_id`: PUT, GET, PATCH, DELETE
/// - `/query`: POST listing with the filter in the body
pub fn default_routes(scope: &str) -> Vec<RouteDefinition> {
    let read = [format!("read:{}", scope)];
    let write = [format!("write:{}", scope)];

    vec![
        RouteDefinition::new("/")
            .handler(Method::POST, RouteHandler::Default)
            .handler(Method::GET, RouteHandler::Query)
            .permissions(Method::POST, write.clone())
            .permissions(Method::GET, read.clone()),
        RouteDefinition::new("/schema")
            .handler(Method::GET, RouteHandler::Schema)
            .permissions(Method::GET, ["read:schema"]),
        RouteDefinition::new("/:_id")
            .handler(Method::PUT, RouteHandler::Default)
            .handler(Method::GET, RouteHandler::Default)
            .handler(Method::PATCH, RouteHandler::Default)
            .handler(Method::DELETE, RouteHandler::Default)
            .permissions(Method::PUT, write.clone())
            .permissions(Method::GET, read.clone())
            .permissions(Method::PATCH, write.clone())
            .permissions(Method::DELETE, write),
        RouteDefinition::new("/query")
            .validate(false)
            .modifying(false)
            .handler(Method::POST, RouteHandler::Query)
            .permissions(Method::POST, read),
    ]
}

/// Success status for a verb
pub fn map_status_code(method: &Method) -> Option<StatusCode> {
    match *method {
        Method::POST => Some(StatusCode::CREATED),
        Method::GET | Method::PUT | Method::PATCH => Some(StatusCode::OK),
        Method::DELETE => Some(StatusCode::NO_CONTENT),
        _ => None,
    }
}

/// Permission action for a verb: `read`, `write` or empty
pub fn http_method_to_action(method: &Method) -> &'static str {
    match *method {
        Method::GET => "read",
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE => "write",
        _ => "",
    }
}

/// CRUD operation served by the default handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbFunction {
    Insert,
    Find,
    Update,
    Delete,
}

impl DbFunction {
    pub fn name(&self) -> &'static str {
        match self {
            DbFunction::Insert => "insert",
            DbFunction::Find => "find",
            DbFunction::Update => "update",
            DbFunction::Delete => "delete",
        }
    }
}

/// CRUD operation for a verb, if any
pub fn http_method_to_db_function(method: &Method) -> Option<DbFunction> {
    match *method {
        Method::POST => Some(DbFunction::Insert),
        Method::GET => Some(DbFunction::Find),
        Method::PUT | Method::PATCH => Some(DbFunction::Update),
        Method::DELETE => Some(DbFunction::Delete),
        _ => None,
    }
}
