//! Lifecycle hooks owned by each resource module

use crate::core::auth::AuthContext;
use crate::core::context::RequestContext;
use crate::core::hook::{MutableHook, ObserverHook};
use crate::core::Document;
use crate::resource::crud::ApiOptions;
use std::sync::Arc;

/// Payload of the pre-insert hook
#[derive(Debug, Clone)]
pub struct InsertPayload {
    pub data: Document,
    pub options: ApiOptions,
}

/// Payload of the pre-update hook
///
/// `changes` is the pending `$set` object; callbacks may rewrite it.
#[derive(Debug, Clone)]
pub struct UpdatePayload {
    pub original: Arc<Document>,
    pub changes: Document,
    pub options: ApiOptions,
}

/// Argument of the access-check hook
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub caller: Arc<AuthContext>,
    pub record: Arc<Document>,
}

/// Extension points of a resource module
///
/// Post hooks and the delete hooks are observers: callbacks run
/// concurrently and any error fails the operation once all have settled.
#[derive(Debug, Default)]
pub struct ApiHooks {
    /// Runs on every request after the context is built; may rewrite it
    pub request: MutableHook<RequestContext>,

    pub pre_insert: MutableHook<InsertPayload>,

    pub post_insert: ObserverHook<Arc<Document>>,

    pub pre_update: MutableHook<UpdatePayload>,

    /// Receives the original document and the updated one
    pub post_update: ObserverHook<(Arc<Document>, Arc<Document>)>,

    pub pre_delete: ObserverHook<Arc<Document>>,

    pub post_delete: ObserverHook<Arc<Document>>,

    /// Record-level access checks; a record is visible when any returns `true`
    pub access_check: ObserverHook<AccessRequest, bool>,
}

impl ApiHooks {
    pub fn new() -> Self {
        Self::default()
    }
}
