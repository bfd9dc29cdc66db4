//! Typed error handling for docrest
//!
//! Every failure a resource can produce is an [`ApiError`] value carrying a
//! kind tag and a structured payload. Errors render themselves as HTTP
//! responses, so handlers simply return `Result<_, ApiError>`.
//!
//! # Error Categories
//!
//! - [`ConfigError`]: invalid resource configuration, raised while building
//! - not found / too many results: singular lookups
//! - unauthorized / forbidden: access checks and permission scopes
//! - validation: propagated verbatim from the schema collaborator
//!
//! # Example
//!
//! ```rust,ignore
//! match module.find_one(query, ApiOptions::default(), FindOptions::default()).await {
//!     Ok(Some(doc)) => println!("Found: {:?}", doc),
//!     Err(ApiError::NotFound { id, .. }) => println!("{} not found", id),
//!     Err(e) => eprintln!("Other error: {}", e),
//!     _ => {}
//! }
//! ```

use crate::core::schema::SchemaError;
use crate::storage::QueryError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// The main error type for docrest
#[derive(Debug)]
pub enum ApiError {
    /// Resource configuration errors (fatal at startup)
    Config(ConfigError),

    /// A singular fetch/update/delete matched nothing
    NotFound { id: String, schema: Option<String> },

    /// A singular fetch matched more than one document
    TooManyResults {
        actual: usize,
        expected: usize,
        query: Value,
    },

    /// An access check rejected (or failed for) a single record
    Unauthorized { method: String, url: String },

    /// The caller lacks the permission scopes required by the route
    Forbidden {
        method: String,
        url: String,
        missing: Vec<String>,
    },

    /// No CRUD operation maps to the HTTP verb
    UnsupportedMethod { method: String },

    /// Schema validation or sanitisation failed
    Validation(SchemaError),

    /// The requested schema does not exist
    NoSchema { name: Option<String> },

    /// The storage collaborator failed
    Storage { message: String },

    /// The request body could not be understood
    InvalidBody { message: String },

    /// A client filter, sort or update could not be interpreted
    InvalidQuery { message: String },

    /// Internal errors (hooks, unexpected collaborator failures)
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Config(e) => write!(f, "{}", e),
            ApiError::NotFound { id, schema } => match schema {
                Some(schema) => write!(f, "{} '{}' not found", schema, id),
                None => write!(f, "'{}' not found", id),
            },
            ApiError::TooManyResults {
                actual, expected, ..
            } => write!(
                f,
                "Too many results: expected {} but got {}",
                expected, actual
            ),
            ApiError::Unauthorized { method, url } => {
                write!(f, "Unauthorized: {} {}", method, url)
            }
            ApiError::Forbidden {
                method,
                url,
                missing,
            } => write!(
                f,
                "Forbidden: {} {} requires scopes [{}]",
                method,
                url,
                missing.join(", ")
            ),
            ApiError::UnsupportedMethod { method } => {
                write!(f, "HTTP method {} is not supported", method)
            }
            ApiError::Validation(e) => write!(f, "{}", e),
            ApiError::NoSchema { name } => match name {
                Some(name) => write!(f, "No schema defined for '{}'", name),
                None => write!(f, "No schema name configured"),
            },
            ApiError::Storage { message } => write!(f, "Storage error: {}", message),
            ApiError::InvalidBody { message } => write!(f, "Invalid request body: {}", message),
            ApiError::InvalidQuery { message } => write!(f, "Invalid query: {}", message),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Config(e) => Some(e),
            ApiError::Validation(e) => Some(e),
            _ => None,
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    /// Build a not-found error for a query or id
    pub fn not_found(id: impl Into<String>, schema: Option<&str>) -> Self {
        ApiError::NotFound {
            id: id.into(),
            schema: schema.map(str::to_string),
        }
    }

    /// Convert a storage collaborator failure, keeping typed errors intact
    ///
    /// Filters and updates the store rejects as malformed are client errors.
    pub fn storage(err: anyhow::Error) -> Self {
        let err = match err.downcast::<ApiError>() {
            Ok(api) => return api,
            Err(err) => err,
        };
        match err.downcast::<QueryError>() {
            Ok(e @ QueryError::ImmutableId) => ApiError::InvalidBody {
                message: e.to_string(),
            },
            Ok(e) => ApiError::InvalidQuery {
                message: e.to_string(),
            },
            Err(err) => ApiError::Storage {
                message: err.to_string(),
            },
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::TooManyResults { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::UnsupportedMethod { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NoSchema { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            ApiError::InvalidQuery { .. } => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Config(e) => e.error_code(),
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::TooManyResults { .. } => "TOO_MANY_RESULTS",
            ApiError::Unauthorized { .. } => "UNAUTHORISED",
            ApiError::Forbidden { .. } => "FORBIDDEN",
            ApiError::UnsupportedMethod { .. } => "HTTP_METHOD_NOT_SUPPORTED",
            ApiError::Validation(_) => "VALIDATION_FAILED",
            ApiError::NoSchema { .. } => "NO_SCHEMA_DEF",
            ApiError::Storage { .. } => "STORAGE_ERROR",
            ApiError::InvalidBody { .. } => "INVALID_BODY",
            ApiError::InvalidQuery { .. } => "INVALID_QUERY",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ApiError::NotFound { id, schema } => Some(serde_json::json!({
                "id": id,
                "type": schema,
            })),
            ApiError::TooManyResults {
                actual,
                expected,
                query,
            } => Some(serde_json::json!({
                "actual": actual,
                "expected": expected,
                "query": query,
            })),
            ApiError::Unauthorized { method, url } => Some(serde_json::json!({
                "method": method,
                "url": url,
            })),
            ApiError::Forbidden { missing, .. } => Some(serde_json::json!({ "missing": missing })),
            ApiError::UnsupportedMethod { method } => {
                Some(serde_json::json!({ "method": method }))
            }
            ApiError::Validation(SchemaError::Invalid { schema, errors }) => {
                Some(serde_json::json!({ "schema": schema, "errors": errors }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "{}", self);
        }
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to resource configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Neither a root path nor a pre-built router was given
    NoRootOrRouter,

    /// The route set is empty
    NoRoutes,

    /// No collection name was given
    NoCollectionName,

    /// Failed to parse a configuration document
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Invalid value in configuration
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// IO error while reading configuration
    IoError { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoRootOrRouter => {
                write!(f, "API module must define either a root or a router")
            }
            ConfigError::NoRoutes => write!(f, "API module must define at least one route"),
            ConfigError::NoCollectionName => {
                write!(f, "API module must define a collection name")
            }
            ConfigError::ParseError { file, message } => {
                if let Some(file) = file {
                    write!(f, "Failed to parse config file '{}': {}", file, message)
                } else {
                    write!(f, "Failed to parse config: {}", message)
                }
            }
            ConfigError::InvalidValue {
                field,
                value,
                message,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, message
                )
            }
            ConfigError::IoError { message } => {
                write!(f, "IO error: {}", message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::NoRootOrRouter => "NO_ROOT_OR_ROUTER_DEF",
            ConfigError::NoRoutes => "NO_ROUTES_DEF",
            ConfigError::NoCollectionName => "NO_COLL_NAME",
            ConfigError::ParseError { .. } => "CONFIG_PARSE_ERROR",
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
            ConfigError::IoError { .. } => "CONFIG_IO_ERROR",
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::Config(err)
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<SchemaError> for ApiError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::NotFound { name } => ApiError::NoSchema { name: Some(name) },
            other => ApiError::Validation(other),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidBody {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Config(ConfigError::IoError {
            message: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for ApiError {
    fn from(err: serde_yaml::Error) -> Self {
        ApiError::Config(ConfigError::ParseError {
            file: None,
            message: err.to_string(),
        })
    }
}

/// Hook and provider callbacks return `anyhow` errors; a wrapped `ApiError`
/// is recovered as-is so the originating error reaches the client.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api) => api,
            Err(err) => match err.downcast::<SchemaError>() {
                Ok(schema) => schema.into(),
                Err(err) => ApiError::Internal(err.to_string()),
            },
        }
    }
}

/// A specialized Result type for docrest operations
pub type ApiResult<T> = Result<T, ApiError>;
