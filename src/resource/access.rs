//! Record-level access control
//!
//! Checks registered on [`ApiHooks::access_check`](crate::resource::ApiHooks)
//! decide whether the caller may see a record. A record is allowed when any
//! check returns `true`. Super callers and modules without checks skip the
//! hook entirely.

use crate::core::auth::AuthContext;
use crate::core::context::RequestContext;
use crate::core::error::{ApiError, ApiResult};
use crate::core::Document;
use crate::resource::hooks::AccessRequest;
use crate::resource::module::ApiModule;
use futures::future::join_all;
use std::sync::Arc;

/// Outcome of the checks for one record
enum Verdict {
    Allowed,
    Denied,
    Failed(anyhow::Error),
}

impl ApiModule {
    async fn verdict(&self, caller: &Arc<AuthContext>, record: Arc<Document>) -> Verdict {
        let results = self
            .hooks
            .access_check
            .invoke(AccessRequest {
                caller: caller.clone(),
                record,
            })
            .await;

        let mut allowed = false;
        for result in results {
            match result {
                Ok(true) => allowed = true,
                Ok(false) => {}
                Err(e) => return Verdict::Failed(e),
            }
        }
        if allowed { Verdict::Allowed } else { Verdict::Denied }
    }

    fn bypasses_access_checks(&self, caller: &AuthContext) -> bool {
        caller.is_super() || !self.hooks.access_check.has_observers()
    }

    /// Check a single record
    ///
    /// Returns `Ok(None)` when the record is rejected. A failing check is an
    /// `Unauthorized` error carrying the request method and URL.
    pub async fn check_access_one(&self, ctx: &RequestContext, record: Document) -> ApiResult<Option<Document>> {
        if self.bypasses_access_checks(&ctx.auth) {
            return Ok(Some(record));
        }
        let record = Arc::new(record);
        match self.verdict(&ctx.auth, record.clone()).await {
            Verdict::Allowed => Ok(Some(Arc::unwrap_or_clone(record))),
            Verdict::Denied => Ok(None),
            Verdict::Failed(e) => {
                tracing::debug!("access check failed for {} {}: {}", ctx.method, ctx.original_uri, e);
                Err(ApiError::Unauthorized {
                    method: ctx.method.to_string(),
                    url: ctx.original_uri.clone(),
                })
            }
        }
    }

    /// Filter a listing down to the records the caller may see
    ///
    /// Records are checked concurrently and keep their order. A failing
    /// check excludes its record and never fails the listing.
    pub async fn check_access_many(&self, caller: &Arc<AuthContext>, records: Vec<Document>) -> Vec<Document> {
        if self.bypasses_access_checks(caller) {
            return records;
        }
        let records: Vec<Arc<Document>> = records.into_iter().map(Arc::new).collect();
        let verdicts = join_all(records.iter().map(|r| self.verdict(caller, r.clone()))).await;

        records
            .into_iter()
            .zip(verdicts)
            .filter_map(|(record, verdict)| match verdict {
                Verdict::Allowed => Some(Arc::unwrap_or_clone(record)),
                Verdict::Denied => None,
                Verdict::Failed(e) => {
                    tracing::debug!("access check failed, record excluded: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::routes::default_routes;
    use crate::server::host::AppContext;
    use anyhow::anyhow;
    use axum::http::Method;
    use serde_json::{Value, json};

    fn module() -> ApiModule {
        ApiModule::builder()
            .root("logs")
            .collection_name("logs")
            .routes(default_routes("logs"))
            .build(Arc::new(AppContext::default()))
            .unwrap()
    }

    fn user(id: &str) -> Arc<AuthContext> {
        Arc::new(AuthContext::User {
            user_id: id.into(),
            scopes: vec![],
        })
    }

    fn ctx(auth: Arc<AuthContext>) -> RequestContext {
        RequestContext {
            method: Method::PUT,
            route: "/:_id".into(),
            original_uri: "/api/logs/1".into(),
            collection_name: "logs".into(),
            schema_name: None,
            query: Document::new(),
            query_pairs: vec![],
            params: vec![],
            data: Document::new(),
            modifying: true,
            validate: true,
            auth,
        }
    }

    fn records(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| json!({"_id": i, "owner": if i % 2 == 0 { "alice" } else { "bob" }}))
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_no_checks_allows_everything() {
        let module = module();
        assert_eq!(module.check_access_many(&user("x"), records(3)).await.len(), 3);
        assert!(
            module
                .check_access_one(&ctx(user("x")), records(1).remove(0))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_owner_check_filters_and_keeps_order() {
        let module = module();
        module.hooks.access_check.tap(|req: AccessRequest| async move {
            Ok(req.record.get("owner").and_then(Value::as_str) == req.caller.user_id())
        });

        let visible = module.check_access_many(&user("alice"), records(5)).await;
        let ids: Vec<_> = visible.iter().map(|r| r["_id"].clone()).collect();
        assert_eq!(ids, vec![json!(0), json!(2), json!(4)]);

        let super_user = Arc::new(AuthContext::Super { user_id: "root".into() });
        assert_eq!(module.check_access_many(&super_user, records(5)).await.len(), 5);
    }

    #[tokio::test]
    async fn test_any_true_check_allows() {
        let module = module();
        module.hooks.access_check.tap(|_req: AccessRequest| async { Ok(false) });
        module.hooks.access_check.tap(|_req: AccessRequest| async { Ok(true) });
        assert_eq!(module.check_access_many(&user("x"), records(2)).await.len(), 2);
    }

    #[tokio::test]
    async fn test_reject_all_yields_empty_listing() {
        let module = module();
        module.hooks.access_check.tap(|_req: AccessRequest| async { Ok(false) });
        assert!(module.check_access_many(&user("x"), records(4)).await.is_empty());
        assert!(
            module
                .check_access_one(&ctx(user("x")), records(1).remove(0))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_errors_swallowed_for_many_raised_for_one() {
        let module = module();
        module
            .hooks
            .access_check
            .tap(|_req: AccessRequest| async { Err(anyhow!("lookup failed")) });

        assert!(module.check_access_many(&user("x"), records(2)).await.is_empty());

        let err = module
            .check_access_one(&ctx(user("x")), records(1).remove(0))
            .await
            .unwrap_err();
        match err {
            ApiError::Unauthorized { method, url } => {
                assert_eq!(method, "PUT");
                assert_eq!(url, "/api/logs/1");
            }
            other => panic!("expected unauthorized, got {:?}", other),
        }
    }
}
