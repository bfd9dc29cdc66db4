//! Configuration loading and management
//!
//! [`ApiConfig`] holds process-wide defaults shared by every resource.
//! [`ModuleConfig`] describes one resource declaratively, including its
//! routes; permission scopes may use `${scope}`, which expands to the
//! module's permissions scope (or its root when no scope is set).

use crate::core::error::ConfigError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Placeholder replaced by the module's permissions scope
pub const SCOPE_PLACEHOLDER: &str = "${scope}";

/// Process-wide API defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Page size used when a listing gives no `limit`
    pub default_page_size: usize,

    /// Upper bound on any requested page size
    pub max_page_size: usize,

    /// Cache lifespan for modules that don't set their own
    pub default_cache_lifespan_ms: u64,

    /// Maximum extra fetches made to refill a page after access filtering;
    /// `None` keeps fetching until the store runs dry
    pub max_backfill_batches: Option<usize>,

    /// Entries each module cache holds before evicting the oldest
    pub max_cache_entries: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: 250,
            default_cache_lifespan_ms: 60_000,
            max_backfill_batches: None,
            max_cache_entries: 256,
        }
    }
}

fn parse_error(file: Option<&str>, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::ParseError {
        file: file.map(str::to_string),
        message: err.to_string(),
    }
}

fn read_file(path: &str) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        message: format!("{}: {}", path, e),
    })
}

impl ApiConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let content = read_file(path)?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| parse_error(Some(path), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| parse_error(None, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make pagination meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_page_size".into(),
                value: "0".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.max_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_page_size".into(),
                value: "0".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn default_cache_lifespan(&self) -> Duration {
        Duration::from_millis(self.default_cache_lifespan_ms)
    }
}

/// Built-in handler a declarative route can bind to a verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    /// Generic CRUD request handler
    Default,
    /// Paginated query handler
    Query,
    /// Schema document handler
    Schema,
}

/// Declarative route definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Path pattern relative to the module root, e.g. `/:_id`
    pub route: String,

    /// Lowercase HTTP verb to handler
    pub handlers: IndexMap<String, HandlerKind>,

    /// Lowercase HTTP verb to required scopes
    #[serde(default)]
    pub permissions: IndexMap<String, Vec<String>>,

    #[serde(default)]
    pub validate: Option<bool>,

    #[serde(default)]
    pub modifying: Option<bool>,

    /// Verbs treated as modifying when `modifying` is unset
    #[serde(default)]
    pub modifiers: Option<Vec<String>>,

    /// Collection override for this route
    #[serde(default)]
    pub collection_name: Option<String>,
}

impl RouteConfig {
    /// Permissions with `${scope}` expanded
    pub fn expanded_permissions(&self, scope: &str) -> IndexMap<String, Vec<String>> {
        self.permissions
            .iter()
            .map(|(verb, scopes)| {
                let scopes = scopes
                    .iter()
                    .map(|s| s.replace(SCOPE_PLACEHOLDER, scope))
                    .collect();
                (verb.to_lowercase(), scopes)
            })
            .collect()
    }
}

/// Declarative configuration of one resource module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Mount point under `/api`
    pub root: Option<String>,

    pub schema_name: Option<String>,

    pub collection_name: Option<String>,

    /// Scope used in permissions, defaults to `root`
    pub permissions_scope: Option<String>,

    /// Prepend the default CRUD routes to `routes`
    pub use_default_routes: bool,

    pub enable_cache: bool,

    pub cache_lifespan_ms: Option<u64>,

    pub default_page_size: Option<usize>,

    pub max_page_size: Option<usize>,

    pub routes: Vec<RouteConfig>,
}

impl ModuleConfig {
    /// Load a module definition from a YAML (or JSON) file
    pub fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let content = read_file(path)?;
        serde_yaml::from_str(&content).map_err(|e| parse_error(Some(path), e))
    }

    /// Load a module definition from a YAML (or JSON) string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| parse_error(None, e))
    }

    /// Scope substituted for `${scope}`
    pub fn scope(&self) -> Option<&str> {
        self.permissions_scope.as_deref().or(self.root.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_api_config_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.default_page_size, 100);
        assert_eq!(config.max_page_size, 250);
        assert_eq!(config.default_cache_lifespan(), Duration::from_secs(60));
        assert_eq!(config.max_backfill_batches, None);
        assert_eq!(config.max_cache_entries, 256);
    }

    #[test]
    fn test_api_config_partial_yaml() {
        let config = ApiConfig::from_yaml_str("max_page_size: 50\nmax_backfill_batches: 4\n").unwrap();
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.default_page_size, 100);
        assert_eq!(config.max_backfill_batches, Some(4));
    }

    #[test]
    fn test_api_config_rejects_zero_page_size() {
        let err = ApiConfig::from_yaml_str("default_page_size: 0").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_INVALID_VALUE");
    }

    #[test]
    fn test_api_config_parse_error_names_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_page_size: [").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        match ApiConfig::from_yaml_file(&path) {
            Err(ConfigError::ParseError { file: Some(f), .. }) => assert_eq!(f, path),
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(matches!(
            ApiConfig::from_yaml_file("/definitely/not/here.yaml"),
            Err(ConfigError::IoError { .. })
        ));
    }

    #[test]
    fn test_module_config_from_json() {
        let json = r#"{
            "root": "logs",
            "schema_name": "log",
            "collection_name": "logs",
            "routes": [
                {
                    "route": "/:_id",
                    "handlers": { "get": "default" },
                    "permissions": { "get": ["read:${scope}"] }
                },
                {
                    "route": "/query",
                    "validate": false,
                    "handlers": { "post": "query" },
                    "permissions": { "post": ["read:${scope}"] }
                }
            ]
        }"#;
        let config = ModuleConfig::from_yaml_str(json).unwrap();
        assert_eq!(config.scope(), Some("logs"));
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.routes[1].handlers["post"], HandlerKind::Query);
        assert_eq!(config.routes[1].validate, Some(false));
        assert_eq!(
            config.routes[0].expanded_permissions("logs")["get"],
            vec!["read:logs".to_string()]
        );
    }

    #[test]
    fn test_permissions_scope_overrides_root() {
        let config = ModuleConfig::from_yaml_str("root: logs\npermissions_scope: audit\n").unwrap();
        assert_eq!(config.scope(), Some("audit"));
        assert!(!config.use_default_routes);
    }
}
