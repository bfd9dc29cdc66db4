//! Schema collaborator contract
//!
//! The framework never validates data itself. It asks a [`SchemaProvider`]
//! for a named [`Schema`] and delegates validation and sanitisation to it.

use crate::core::Document;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// A single field validation error
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Errors raised by the schema collaborator
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// Data failed validation
    #[error("Validation failed for schema '{schema}': {}", format_errors(.errors))]
    Invalid {
        schema: String,
        errors: Vec<FieldError>,
    },

    /// The named schema is unknown
    #[error("Schema '{name}' not found")]
    NotFound { name: String },

    /// Anything else the collaborator wants to surface
    #[error("Schema error: {0}")]
    Other(String),
}

fn format_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Options passed to [`Schema::validate`]
#[derive(Debug, Clone, Serialize)]
pub struct ValidateOptions {
    /// Skip required-field checks (queries are partial documents)
    pub ignore_required: bool,
    /// Fill in schema defaults for missing fields
    pub use_defaults: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            ignore_required: false,
            use_defaults: true,
        }
    }
}

impl ValidateOptions {
    /// Options used when validating query filters
    pub fn for_query() -> Self {
        Self {
            ignore_required: true,
            use_defaults: false,
        }
    }
}

/// Options passed to [`Schema::sanitise`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct SanitiseOptions {
    /// Strip fields marked `isReadOnly`
    pub is_read_only: bool,
    /// Strip fields marked `isInternal`
    pub is_internal: bool,
    /// Fail on unknown fields instead of passing them through
    pub strict: bool,
}

impl SanitiseOptions {
    /// Incoming request data: read-only fields are dropped
    pub fn read_only() -> Self {
        Self {
            is_read_only: true,
            ..Default::default()
        }
    }

    /// Outgoing response data: internal fields are dropped, unknown kept
    pub fn output() -> Self {
        Self {
            is_internal: true,
            strict: false,
            ..Default::default()
        }
    }
}

/// A built schema
pub trait Schema: Send + Sync {
    /// Schema name
    fn name(&self) -> &str;

    /// Validate (and possibly coerce/default) a document
    fn validate(&self, data: Document, options: &ValidateOptions) -> Result<Document, SchemaError>;

    /// Strip fields according to the sanitise options
    fn sanitise(&self, data: Document, options: &SanitiseOptions) -> Result<Document, SchemaError>;

    /// JSON-Schema-like description, with per-property `isSearchable`,
    /// `isReadOnly` and `isInternal` markers
    fn built(&self) -> &Value;

    /// Names of the properties flagged as searchable
    fn searchable_fields(&self) -> Vec<String> {
        self.built()
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .filter(|(_, p)| p.get("isSearchable").and_then(Value::as_bool) == Some(true))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Resolves schemas by name
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Look up a schema; `data` may be used to pick a schema variant
    async fn get_schema(&self, name: &str, data: &Document) -> Result<Arc<dyn Schema>, SchemaError>;
}
