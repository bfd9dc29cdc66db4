//! Route handlers and router binding
//!
//! Each route verb becomes an axum handler wrapped in a permission layer.
//! The layer resolves the caller through the auth provider, rejects
//! requests lacking the route's scopes, and hands the caller to the
//! handler through the request extensions.

use crate::core::auth::AuthContext;
use crate::core::context::RequestContext;
use crate::core::error::{ApiError, ApiResult};
use crate::core::schema::SanitiseOptions;
use crate::resource::crud::ApiOptions;
use crate::resource::module::ApiModule;
use crate::resource::pipeline::ApiRequest;
use crate::resource::routes::{DbFunction, RouteDefinition, RouteHandler, http_method_to_db_function, map_status_code};
use crate::server::host::AppContext;
use crate::storage::FindOptions;
use axum::Json;
use axum::Router;
use axum::extract::{OriginalUri, Request, State};
use axum::handler::Handler;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use serde_json::Value;
use std::sync::Arc;

/// Content type of the schema document
pub const SCHEMA_CONTENT_TYPE: &str = "application/schema+json";

impl ApiModule {
    /// Generic CRUD handler
    ///
    /// The verb picks the operation. `PUT`, `PATCH` and `DELETE` are access
    /// checked against the filter before running; `GET` results are
    /// filtered afterwards. A `GET` addressed by `_id` answers with a single
    /// document.
    pub async fn handle_request(&self, ctx: RequestContext) -> ApiResult<Response> {
        let function = http_method_to_db_function(&ctx.method).ok_or_else(|| ApiError::UnsupportedMethod {
            method: ctx.method.to_string(),
        })?;
        let ctx = self.hooks.request.invoke(ctx).await?;

        if matches!(ctx.method, Method::PUT | Method::PATCH | Method::DELETE) {
            self.pre_check_target(&ctx).await?;
        }

        let mut options = ApiOptions::new().collection_name(ctx.collection_name.clone());
        options.schema_name = ctx.schema_name.clone();
        let schema_name = ctx.schema_name.as_deref();
        let output = SanitiseOptions::output();

        let body = match function {
            DbFunction::Insert => {
                let doc = self.insert(ctx.data.clone(), options).await?;
                Value::Object(self.sanitise(schema_name, doc, &output).await?)
            }
            DbFunction::Find => {
                let docs = self
                    .find(ctx.query.clone(), options, FindOptions::default())
                    .await?;
                let docs = self.check_access_many(&ctx.auth, docs).await;
                let mut docs = self.sanitise_many(schema_name, docs, &output).await?;
                match ctx.param("_id") {
                    Some(id) if docs.is_empty() => return Err(ApiError::not_found(id, schema_name)),
                    Some(_) => Value::Object(docs.swap_remove(0)),
                    None => Value::Array(docs.into_iter().map(Value::Object).collect()),
                }
            }
            DbFunction::Update => {
                let doc = self
                    .update(ctx.query.clone(), ctx.data.clone(), options)
                    .await?;
                Value::Object(self.sanitise(schema_name, doc, &output).await?)
            }
            DbFunction::Delete => {
                let doc = self.delete(ctx.query.clone(), options).await?;
                Value::Object(self.sanitise(schema_name, doc, &output).await?)
            }
        };

        if function != DbFunction::Find {
            let resource = body
                .get("_id")
                .map(|id| id.as_str().map_or_else(|| id.to_string(), str::to_string))
                .unwrap_or_else(|| Value::Object(ctx.query.clone()).to_string());
            tracing::debug!(
                "API_{} {} by {}",
                function.name().to_uppercase(),
                resource,
                ctx.caller()
            );
        }

        let status = map_status_code(&ctx.method).unwrap_or(StatusCode::OK);
        if status == StatusCode::NO_CONTENT {
            return Ok(status.into_response());
        }
        Ok((status, Json(body)).into_response())
    }

    /// Access check the stored record a write is about to touch
    ///
    /// A filter that matches nothing passes; the operation itself reports
    /// the miss.
    async fn pre_check_target(&self, ctx: &RequestContext) -> ApiResult<()> {
        let store = self.store().await?;
        let target = store
            .find(&ctx.collection_name, &ctx.query, &FindOptions::default().with_limit(1))
            .await
            .map_err(ApiError::storage)?
            .into_iter()
            .next();
        let Some(record) = target else {
            return Ok(());
        };
        match self.check_access_one(ctx, record).await? {
            Some(_) => Ok(()),
            None => Err(ApiError::Unauthorized {
                method: ctx.method.to_string(),
                url: ctx.original_uri.clone(),
            }),
        }
    }

    /// Serve the schema document of the resource
    pub async fn serve_schema(&self, ctx: RequestContext) -> ApiResult<Response> {
        let Some(name) = ctx.schema_name.as_deref() else {
            return Err(ApiError::NoSchema { name: None });
        };
        let mut data = ctx.query.clone();
        data.extend(ctx.data.clone());
        let schema = self.get_schema(name, &data).await?;

        Ok(([(CONTENT_TYPE, SCHEMA_CONTENT_TYPE)], Json(schema.built().clone())).into_response())
    }

    /// Router serving every route of this module, relative to its root
    pub fn build_router(self: &Arc<Self>) -> Router {
        let mut router = Router::new();

        for route in &self.routes {
            let route = Arc::new(route.clone());
            let mut method_router: MethodRouter = MethodRouter::new();
            let mut bound = 0;

            for (method, handler) in &route.handlers {
                let Ok(filter) = MethodFilter::try_from(method.clone()) else {
                    tracing::warn!("cannot route {} {}, unsupported method", method, route.route);
                    continue;
                };
                let endpoint = {
                    let module = self.clone();
                    let route = route.clone();
                    let handler = handler.clone();
                    move |request: ApiRequest| {
                        let module = module.clone();
                        let route = route.clone();
                        let handler = handler.clone();
                        async move { dispatch(module, route, handler, request).await }
                    }
                };
                let permissions = RoutePermissions {
                    scopes: Arc::new(route.scopes_for(method).to_vec()),
                    context: self.context.clone(),
                };
                method_router = method_router.on(
                    filter,
                    endpoint.layer(middleware::from_fn_with_state(permissions, require_permissions)),
                );
                bound += 1;
            }

            if bound == 0 {
                continue;
            }
            for path in route.axum_paths() {
                tracing::debug!("route {} bound", path);
                router = router.route(&path, method_router.clone());
            }
        }
        router
    }

    /// Attach this module to an application router
    ///
    /// A module with a pre-built router serves its routes there; otherwise
    /// they are nested under `/api/<root>`.
    pub fn mount(self: &Arc<Self>, app: Router) -> Router {
        let routes = self.build_router();
        match (&self.router, self.root()) {
            (Some(existing), _) => app.merge(existing.clone().merge(routes)),
            (None, Some(root)) => app.nest(&format!("/api/{}", root.trim_matches('/')), routes),
            (None, None) => app,
        }
    }
}

/// Run the pipeline then the route's handler
async fn dispatch(
    module: Arc<ApiModule>,
    route: Arc<RouteDefinition>,
    handler: RouteHandler,
    request: ApiRequest,
) -> ApiResult<Response> {
    let mut ctx = module.process_request(&route, request);
    module.sanitise_request_data(&mut ctx).await?;

    match handler {
        RouteHandler::Default => module.handle_request(ctx).await,
        RouteHandler::Query => module.handle_query(ctx).await,
        RouteHandler::Schema => module.serve_schema(ctx).await,
        RouteHandler::Custom(custom) => custom(module.clone(), ctx).await,
    }
}

/// Scopes required by one route verb
#[derive(Clone)]
struct RoutePermissions {
    scopes: Arc<Vec<String>>,
    context: Arc<AppContext>,
}

async fn require_permissions(State(permissions): State<RoutePermissions>, mut request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let url = request
        .extensions()
        .get::<OriginalUri>()
        .map_or_else(|| request.uri().to_string(), |o| o.0.to_string());

    let auth = match permissions.context.auth.get() {
        Some(provider) => match provider.extract_context(request.headers()).await {
            Ok(auth) => auth,
            Err(e) => {
                tracing::debug!("authentication failed for {} {}: {}", method, url, e);
                return ApiError::Unauthorized { method, url }.into_response();
            }
        },
        None => AuthContext::Anonymous,
    };

    let missing = auth.missing_scopes(&permissions.scopes);
    if !missing.is_empty() {
        if auth.is_anonymous() {
            return ApiError::Unauthorized { method, url }.into_response();
        }
        return ApiError::Forbidden { method, url, missing }.into_response();
    }

    request.extensions_mut().insert(Arc::new(auth));
    next.run(request).await
}
