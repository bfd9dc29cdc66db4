//! Reference schema implementation
//!
//! A small JSON-Schema-flavoured [`Schema`](crate::core::schema::Schema) used
//! by tests, demos and applications that don't bring their own validator.
//! It understands `type`, `enum`, `default`, `required` and the
//! `isReadOnly` / `isInternal` / `isSearchable` property markers.

pub mod filters;
pub mod validators;

use crate::core::Document;
use crate::core::schema::{
    FieldError, SanitiseOptions, Schema, SchemaError, SchemaProvider, ValidateOptions,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Schema built from a JSON-Schema-like document
#[derive(Debug, Clone)]
pub struct BasicSchema {
    name: String,
    built: Value,
    properties: Map<String, Value>,
    required: Vec<String>,
    allow_unknown: bool,
}

impl BasicSchema {
    /// Build a schema; `built` must contain a `properties` object
    pub fn new(name: impl Into<String>, built: Value) -> Result<Self, SchemaError> {
        let name = name.into();
        let properties = built
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| SchemaError::Other(format!("schema '{}' has no properties", name)))?;
        let required = built
            .get("required")
            .and_then(Value::as_array)
            .map(|r| {
                r.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let allow_unknown = built.get("additionalProperties") != Some(&Value::Bool(false));

        Ok(Self {
            name,
            built,
            properties,
            required,
            allow_unknown,
        })
    }

    fn has_marker(&self, field: &str, marker: &str) -> bool {
        self.properties
            .get(field)
            .and_then(|p| p.get(marker))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn check_field(&self, field: &str, value: Value) -> Result<Value, String> {
        let Some(prop) = self.properties.get(field) else {
            return if self.allow_unknown {
                Ok(value)
            } else {
                Err(format!("'{}' is not a known property", field))
            };
        };
        let mut value = value;
        if let Some(expected) = prop.get("type").and_then(Value::as_str) {
            value = filters::coerce_to(expected.to_string())(field, value)
                .map_err(|e| e.to_string())?;
            validators::json_type(expected.to_string())(field, &value)?;
        }
        if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
            validators::in_list(allowed.clone())(field, &value)?;
        }
        Ok(value)
    }

    fn invalid(&self, errors: Vec<FieldError>) -> SchemaError {
        SchemaError::Invalid {
            schema: self.name.clone(),
            errors,
        }
    }
}

impl Schema for BasicSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, data: Document, options: &ValidateOptions) -> Result<Document, SchemaError> {
        let mut errors = Vec::new();
        let mut out = Map::new();

        for (field, value) in data {
            match self.check_field(&field, value) {
                Ok(value) => {
                    out.insert(field, value);
                }
                Err(message) => errors.push(FieldError { field, message }),
            }
        }
        if options.use_defaults {
            for (field, prop) in &self.properties {
                if let Some(default) = prop.get("default") {
                    out.entry(field.clone()).or_insert_with(|| default.clone());
                }
            }
        }
        if !options.ignore_required {
            let required = validators::required();
            for field in &self.required {
                if let Err(message) = required(field, out.get(field)) {
                    errors.push(FieldError {
                        field: field.clone(),
                        message,
                    });
                }
            }
        }
        if errors.is_empty() {
            Ok(out)
        } else {
            Err(self.invalid(errors))
        }
    }

    fn sanitise(&self, data: Document, options: &SanitiseOptions) -> Result<Document, SchemaError> {
        let mut out = Map::new();
        for (field, value) in data {
            if options.is_read_only && self.has_marker(&field, "isReadOnly") {
                continue;
            }
            if options.is_internal && self.has_marker(&field, "isInternal") {
                continue;
            }
            if options.strict && !self.properties.contains_key(&field) {
                return Err(self.invalid(vec![FieldError {
                    message: format!("'{}' is not a known property", field),
                    field,
                }]));
            }
            out.insert(field, value);
        }
        Ok(out)
    }

    fn built(&self) -> &Value {
        &self.built
    }
}

/// In-memory schema registry
#[derive(Default, Clone)]
pub struct InMemorySchemaRegistry {
    schemas: Arc<RwLock<HashMap<String, Arc<dyn Schema>>>>,
}

impl InMemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under its own name, replacing any previous one
    pub fn register(&self, schema: impl Schema + 'static) {
        let name = schema.name().to_string();
        match self.schemas.write() {
            Ok(mut schemas) => {
                schemas.insert(name, Arc::new(schema));
            }
            Err(e) => tracing::error!("failed to register schema '{}': {}", name, e),
        }
    }

    /// Register several JSON-Schema-like documents keyed by name
    pub fn with_schemas(self, schemas: impl IntoIterator<Item = (String, Value)>) -> Result<Self, SchemaError> {
        for (name, built) in schemas {
            self.register(BasicSchema::new(name, built)?);
        }
        Ok(self)
    }
}

#[async_trait]
impl SchemaProvider for InMemorySchemaRegistry {
    async fn get_schema(&self, name: &str, _data: &Document) -> Result<Arc<dyn Schema>, SchemaError> {
        let schemas = self
            .schemas
            .read()
            .map_err(|e| SchemaError::Other(format!("Failed to acquire read lock: {}", e)))?;
        schemas.get(name).cloned().ok_or_else(|| SchemaError::NotFound {
            name: name.to_string(),
        })
    }
}
