//! Application context shared by every resource module
//!
//! `AppContext` holds the external collaborators (document store, schema
//! provider, auth provider) and the process-wide [`ApiConfig`]. Each
//! collaborator sits in a [`Dependency`] slot that can be filled at any time;
//! code that needs one awaits [`Dependency::ready`], so modules can be built
//! and mounted before their collaborators exist.
//!
//! # Example
//!
//! ```rust,ignore
//! let context = Arc::new(AppContext::new(ApiConfig::default()));
//! context.store.provide(Arc::new(InMemoryDocumentStore::new()));
//!
//! let store = context.store.ready().await?;
//! ```

use crate::config::ApiConfig;
use crate::core::auth::AuthProvider;
use crate::core::error::{ApiError, ApiResult};
use crate::core::schema::SchemaProvider;
use crate::storage::DocumentStore;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// A lazily provided shared collaborator
pub struct Dependency<T: ?Sized> {
    name: &'static str,
    slot: watch::Sender<Option<Arc<T>>>,
}

impl<T: ?Sized + Send + Sync> Dependency<T> {
    pub fn new(name: &'static str) -> Self {
        let (slot, _) = watch::channel(None);
        Self { name, slot }
    }

    /// Provide (or replace) the collaborator, waking every waiter
    pub fn provide(&self, value: Arc<T>) {
        self.slot.send_replace(Some(value));
        tracing::debug!("dependency '{}' provided", self.name);
    }

    /// The collaborator, if already provided
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Wait until the collaborator has been provided
    pub async fn ready(&self) -> ApiResult<Arc<T>> {
        if let Some(value) = self.get() {
            return Ok(value);
        }
        let mut rx = self.slot.subscribe();
        let value = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|e| ApiError::Internal(format!("dependency '{}' unavailable: {}", self.name, e)))?
            .clone();
        value.ok_or_else(|| ApiError::Internal(format!("dependency '{}' unavailable", self.name)))
    }
}

impl<T: ?Sized> fmt::Debug for Dependency<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("name", &self.name)
            .field("ready", &self.slot.borrow().is_some())
            .finish()
    }
}

/// Collaborators and configuration shared by resource modules
#[derive(Debug)]
pub struct AppContext {
    /// Process-wide API defaults
    pub config: ApiConfig,

    /// Document store collaborator
    pub store: Dependency<dyn DocumentStore>,

    /// Schema collaborator
    pub schemas: Dependency<dyn SchemaProvider>,

    /// Authentication collaborator
    pub auth: Dependency<dyn AuthProvider>,
}

impl AppContext {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            store: Dependency::new("store"),
            schemas: Dependency::new("schemas"),
            auth: Dependency::new("auth"),
        }
    }

    /// Provide the document store
    pub fn with_store(self, store: impl DocumentStore + 'static) -> Self {
        self.store.provide(Arc::new(store));
        self
    }

    /// Provide the schema collaborator
    pub fn with_schemas(self, schemas: impl SchemaProvider + 'static) -> Self {
        self.schemas.provide(Arc::new(schemas));
        self
    }

    /// Provide the auth collaborator
    pub fn with_auth_provider(self, auth: impl AuthProvider + 'static) -> Self {
        self.auth.provide(Arc::new(auth));
        self
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new(ApiConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::NoAuthProvider;
    use crate::storage::InMemoryDocumentStore;
    use std::time::Duration;

    #[test]
    fn test_dependencies_start_empty() {
        let context = AppContext::default();
        assert!(!context.store.is_ready());
        assert!(context.schemas.get().is_none());
        assert_eq!(context.config, ApiConfig::default());
    }

    #[tokio::test]
    async fn test_ready_resolves_immediately_when_provided() {
        let context = AppContext::default().with_auth_provider(NoAuthProvider);
        assert!(context.auth.ready().await.is_ok());
    }

    #[tokio::test]
    async fn test_ready_waits_for_late_provider() {
        let context = Arc::new(AppContext::default());

        let waiter = {
            let context = context.clone();
            tokio::spawn(async move { context.store.ready().await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        context.store.provide(Arc::new(InMemoryDocumentStore::new()));
        assert!(waiter.await.unwrap());
    }
}
