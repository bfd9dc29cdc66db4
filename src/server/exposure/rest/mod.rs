//! REST exposure of resource modules
//!
//! Produces the application's Axum `Router`: health checks, every
//! registered resource, and any custom routes, wrapped in request tracing.

use crate::core::error::ApiResult;
use crate::resource::ApiModule;
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// REST API exposure implementation
pub struct RestExposure;

impl RestExposure {
    /// Build the REST router
    ///
    /// Returns a router with:
    /// - Health check routes
    /// - Each module's routes, under `/api/<root>` or its own router
    /// - Custom routes
    pub fn build_router(modules: &[Arc<ApiModule>], custom_routes: Vec<Router>) -> ApiResult<Router> {
        let mut app = Self::health_routes();

        for module in modules {
            app = module.mount(app);
        }

        for custom_router in custom_routes {
            app = app.merge(custom_router);
        }

        Ok(app.layer(TraceLayer::new_for_http()))
    }

    /// Build health check routes
    fn health_routes() -> Router {
        Router::new()
            .route("/health", get(Self::health_check))
            .route("/healthz", get(Self::health_check))
    }

    /// Health check endpoint handler
    async fn health_check() -> Json<Value> {
        Json(json!({
            "status": "ok",
            "service": env!("CARGO_PKG_NAME")
        }))
    }
}
