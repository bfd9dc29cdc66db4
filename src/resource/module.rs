//! Resource modules and their builder

use crate::config::ModuleConfig;
use crate::core::cache::DataCache;
use crate::core::error::{ApiResult, ConfigError};
use crate::core::schema::Schema;
use crate::core::Document;
use crate::resource::hooks::ApiHooks;
use crate::resource::metadata::{MetadataContext, generate_api_metadata};
use crate::resource::routes::{RouteDefinition, default_routes};
use crate::server::host::AppContext;
use crate::storage::DocumentStore;
use axum::Router;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Picks the schema for a piece of request data
pub trait SchemaNameResolver: Send + Sync {
    /// `default` is the module's configured schema name
    fn schema_name(&self, default: Option<&str>, data: &Document) -> Option<String>;
}

/// Always uses the module's schema
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleSchemaName;

impl SchemaNameResolver for ModuleSchemaName {
    fn schema_name(&self, default: Option<&str>, _data: &Document) -> Option<String> {
        default.map(str::to_string)
    }
}

impl<F> SchemaNameResolver for F
where
    F: Fn(Option<&str>, &Document) -> Option<String> + Send + Sync,
{
    fn schema_name(&self, default: Option<&str>, data: &Document) -> Option<String> {
        self(default, data)
    }
}

/// A collection exposed as a REST resource
///
/// Built once by [`ApiModuleBuilder`] and shared behind an `Arc` by every
/// request it serves. Per-request state lives in
/// [`RequestContext`](crate::core::RequestContext), never here.
pub struct ApiModule {
    pub(crate) root: Option<String>,
    pub(crate) router: Option<Router>,
    pub(crate) schema_name: Option<String>,
    pub(crate) collection_name: String,
    pub(crate) routes: Vec<RouteDefinition>,
    pub(crate) default_page_size: usize,
    pub(crate) max_page_size: usize,
    pub(crate) schema_name_resolver: Arc<dyn SchemaNameResolver>,
    pub(crate) cache: DataCache,
    pub(crate) context: Arc<AppContext>,

    /// Lifecycle hooks; register callbacks before serving
    pub hooks: ApiHooks,
}

impl ApiModule {
    pub fn builder() -> ApiModuleBuilder {
        ApiModuleBuilder::new()
    }

    /// Mount point under `/api`
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.schema_name.as_deref()
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Routes after de-duplication, with generated metadata
    pub fn routes(&self) -> &[RouteDefinition] {
        &self.routes
    }

    pub fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    pub fn cache(&self) -> &DataCache {
        &self.cache
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    /// Schema name for a piece of request data
    pub fn resolve_schema_name(&self, data: &Document) -> Option<String> {
        self.schema_name_resolver
            .schema_name(self.schema_name.as_deref(), data)
    }

    /// Wait for the document store
    pub async fn store(&self) -> ApiResult<Arc<dyn DocumentStore>> {
        self.context.store.ready().await
    }

    /// Look up a schema by name
    pub async fn get_schema(&self, name: &str, data: &Document) -> ApiResult<Arc<dyn Schema>> {
        let schemas = self.context.schemas.ready().await?;
        Ok(schemas.get_schema(name, data).await?)
    }
}

impl fmt::Debug for ApiModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiModule")
            .field("root", &self.root)
            .field("schema_name", &self.schema_name)
            .field("collection_name", &self.collection_name)
            .field("routes", &self.routes.iter().map(|r| &r.route).collect::<Vec<_>>())
            .field("cache", &self.cache)
            .finish()
    }
}

/// Builder for [`ApiModule`]
///
/// # Example
///
/// ```rust,ignore
/// let module = ApiModule::builder()
///     .root("logs")
///     .schema_name("log")
///     .collection_name("logs")
///     .use_default_routes(true)
///     .build(context)?;
/// ```
#[derive(Default)]
pub struct ApiModuleBuilder {
    root: Option<String>,
    router: Option<Router>,
    schema_name: Option<String>,
    collection_name: Option<String>,
    permissions_scope: Option<String>,
    use_default_routes: bool,
    routes: Vec<RouteDefinition>,
    enable_cache: bool,
    cache_lifespan: Option<Duration>,
    default_page_size: Option<usize>,
    max_page_size: Option<usize>,
    schema_name_resolver: Option<Arc<dyn SchemaNameResolver>>,
}

impl ApiModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a declarative module definition
    pub fn from_config(config: ModuleConfig) -> Result<Self, ConfigError> {
        let scope = config.scope().unwrap_or_default().to_string();
        let routes = config
            .routes
            .iter()
            .map(|r| RouteDefinition::from_config(r, &scope))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root: config.root,
            schema_name: config.schema_name,
            collection_name: config.collection_name,
            permissions_scope: config.permissions_scope,
            use_default_routes: config.use_default_routes,
            routes,
            enable_cache: config.enable_cache,
            cache_lifespan: config.cache_lifespan_ms.map(Duration::from_millis),
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            ..Self::default()
        })
    }

    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Serve the routes on an existing router instead of `/api/<root>`
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn schema_name(mut self, name: impl Into<String>) -> Self {
        self.schema_name = Some(name.into());
        self
    }

    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    /// Scope used by the default routes' permissions (defaults to the root)
    pub fn permissions_scope(mut self, scope: impl Into<String>) -> Self {
        self.permissions_scope = Some(scope.into());
        self
    }

    /// Put the standard CRUD routes ahead of any custom ones
    pub fn use_default_routes(mut self, enabled: bool) -> Self {
        self.use_default_routes = enabled;
        self
    }

    pub fn route(mut self, route: RouteDefinition) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(mut self, routes: impl IntoIterator<Item = RouteDefinition>) -> Self {
        self.routes.extend(routes);
        self
    }

    pub fn enable_cache(mut self, enabled: bool) -> Self {
        self.enable_cache = enabled;
        self
    }

    pub fn cache_lifespan(mut self, lifespan: Duration) -> Self {
        self.cache_lifespan = Some(lifespan);
        self
    }

    pub fn default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = Some(size);
        self
    }

    pub fn max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = Some(size);
        self
    }

    pub fn schema_name_resolver(mut self, resolver: impl SchemaNameResolver + 'static) -> Self {
        self.schema_name_resolver = Some(Arc::new(resolver));
        self
    }

    /// Validate the definition and build the module
    ///
    /// Fails with [`ConfigError::NoRootOrRouter`], [`ConfigError::NoRoutes`]
    /// or [`ConfigError::NoCollectionName`]. Routes sharing a path are
    /// reduced to the first definition.
    pub fn build(self, context: Arc<AppContext>) -> ApiResult<ApiModule> {
        if self.root.is_none() && self.router.is_none() {
            return Err(ConfigError::NoRootOrRouter.into());
        }

        let scope = self
            .permissions_scope
            .as_deref()
            .or(self.root.as_deref())
            .unwrap_or_default();
        let mut all_routes = if self.use_default_routes {
            default_routes(scope)
        } else {
            Vec::new()
        };
        all_routes.extend(self.routes);
        if all_routes.is_empty() {
            return Err(ConfigError::NoRoutes.into());
        }

        let collection_name = self.collection_name.ok_or(ConfigError::NoCollectionName)?;

        let mut unique: IndexMap<String, RouteDefinition> = IndexMap::new();
        for route in all_routes {
            if unique.contains_key(&route.route) {
                tracing::warn!(
                    "duplicate route defined for path '{}', first definition will be used",
                    route.route
                );
                continue;
            }
            unique.insert(route.route.clone(), route);
        }
        let mut routes: Vec<RouteDefinition> = unique.into_values().collect();

        let default_page_size = self.default_page_size.unwrap_or(context.config.default_page_size);
        let max_page_size = self.max_page_size.unwrap_or(context.config.max_page_size);

        generate_api_metadata(
            &mut routes,
            &MetadataContext {
                schema_name: self.schema_name.as_deref().unwrap_or_default(),
                collection_name: &collection_name,
                default_page_size,
                max_page_size,
            },
        );

        let cache = DataCache::new(
            self.enable_cache,
            self.cache_lifespan
                .unwrap_or_else(|| context.config.default_cache_lifespan()),
        )
        .with_max_entries(context.config.max_cache_entries);

        Ok(ApiModule {
            root: self.root,
            router: self.router,
            schema_name: self.schema_name,
            collection_name,
            routes,
            default_page_size,
            max_page_size,
            schema_name_resolver: self
                .schema_name_resolver
                .unwrap_or_else(|| Arc::new(ModuleSchemaName)),
            cache,
            context,
            hooks: ApiHooks::default(),
        })
    }
}
