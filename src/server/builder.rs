//! ServerBuilder for fluent API to build HTTP servers

use super::exposure::RestExposure;
use super::host::AppContext;
use crate::config::ApiConfig;
use crate::core::auth::{AuthProvider, NoAuthProvider};
use crate::core::error::ApiResult;
use crate::core::schema::SchemaProvider;
use crate::resource::{ApiModule, ApiModuleBuilder};
use crate::storage::DocumentStore;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for creating HTTP servers from resource modules
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_store(InMemoryDocumentStore::new())
///     .with_schemas(registry)
///     .with_auth_provider(HeaderAuthProvider)
///     .register_module(
///         ApiModule::builder()
///             .root("logs")
///             .schema_name("log")
///             .collection_name("logs")
///             .use_default_routes(true),
///     )?
///     .build()?;
/// ```
pub struct ServerBuilder {
    context: Arc<AppContext>,
    modules: Vec<Arc<ApiModule>>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder with the default [`ApiConfig`]
    pub fn new() -> Self {
        Self::with_config(ApiConfig::default())
    }

    pub fn with_config(config: ApiConfig) -> Self {
        Self::from_context(Arc::new(AppContext::new(config)))
    }

    /// Build on an existing context, e.g. one whose collaborators are
    /// provided later
    pub fn from_context(context: Arc<AppContext>) -> Self {
        Self {
            context,
            modules: Vec::new(),
            custom_routes: Vec::new(),
        }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    /// Set the document store
    pub fn with_store(self, store: impl DocumentStore + 'static) -> Self {
        self.context.store.provide(Arc::new(store));
        self
    }

    /// Set the schema provider
    pub fn with_schemas(self, schemas: impl SchemaProvider + 'static) -> Self {
        self.context.schemas.provide(Arc::new(schemas));
        self
    }

    /// Set the auth provider
    pub fn with_auth_provider(self, auth: impl AuthProvider + 'static) -> Self {
        self.context.auth.provide(Arc::new(auth));
        self
    }

    /// Add custom routes to the server
    ///
    /// Use this for endpoints that don't belong to a resource, such as
    /// authentication flows or webhooks.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build a module against this server's context and register it
    ///
    /// Configuration errors surface here, before anything is served.
    pub fn register_module(self, module: ApiModuleBuilder) -> ApiResult<Self> {
        let module = Arc::new(module.build(self.context.clone())?);
        Ok(self.register_api_module(module))
    }

    /// Register an already built module
    ///
    /// Keep a clone of the `Arc` to tap the module's hooks after
    /// registration.
    pub fn register_api_module(mut self, module: Arc<ApiModule>) -> Self {
        tracing::info!(
            "registered resource '{}' ({} routes)",
            module.root().unwrap_or(module.collection_name()),
            module.routes().len()
        );
        self.modules.push(module);
        self
    }

    /// Build the final router
    pub fn build(self) -> ApiResult<Router> {
        if !self.context.auth.is_ready() {
            tracing::warn!("no auth provider configured, every caller is anonymous");
            self.context.auth.provide(Arc::new(NoAuthProvider));
        }
        RestExposure::build_router(&self.modules, self.custom_routes)
    }

    /// Build and serve the application until ctrl-c or SIGTERM
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on ctrl-c, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install ctrl-c handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ApiError;
    use crate::storage::InMemoryDocumentStore;

    fn logs() -> ApiModuleBuilder {
        ApiModule::builder()
            .root("logs")
            .collection_name("logs")
            .use_default_routes(true)
    }

    #[test]
    fn test_register_module_surfaces_config_errors() {
        let result = ServerBuilder::new().register_module(ApiModule::builder().root("logs"));
        match result {
            Err(ApiError::Config(e)) => assert_eq!(e.error_code(), "NO_ROUTES_DEF"),
            _ => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn test_build_provides_default_auth() {
        let builder = ServerBuilder::new()
            .with_store(InMemoryDocumentStore::new())
            .register_module(logs())
            .unwrap();
        let context = builder.context().clone();
        assert!(!context.auth.is_ready());

        builder.build().unwrap();
        assert!(context.auth.is_ready());
    }

    #[test]
    fn test_modules_share_the_context() {
        let context = Arc::new(AppContext::new(ApiConfig {
            max_page_size: 5,
            ..Default::default()
        }));
        let module = Arc::new(logs().build(context.clone()).unwrap());
        let builder = ServerBuilder::from_context(context).register_api_module(module.clone());
        assert_eq!(module.max_page_size(), 5);
        assert!(builder.build().is_ok());
    }
}
