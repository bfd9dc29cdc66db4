//! Lifecycle hooks
//!
//! Two flavours of extension point:
//!
//! - [`MutableHook`]: callbacks run one after another in registration order,
//!   each receiving the payload returned by the previous one.
//! - [`ObserverHook`]: callbacks receive a clone of the argument and run
//!   concurrently. Every outcome is collected before `invoke` returns, so one
//!   failing observer never prevents the others from running.
//!
//! ```rust,ignore
//! let hooks = ApiHooks::default();
//! hooks.pre_insert.tap(|mut payload: InsertPayload| async move {
//!     payload.data.insert("createdAt".into(), json!(Utc::now()));
//!     Ok(payload)
//! });
//! hooks.post_insert.tap(|doc| async move {
//!     tracing::info!("inserted {:?}", doc.get("_id"));
//!     Ok(())
//! });
//! ```

use anyhow::Result;
use futures::future::{BoxFuture, join_all};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};

type MutableCallback<P> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<P>> + Send + Sync>;
type ObserverCallback<A, R> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<R>> + Send + Sync>;

fn snapshot<T: Clone>(lock: &RwLock<Vec<T>>) -> Vec<T> {
    match lock.read() {
        Ok(callbacks) => callbacks.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn push<T>(lock: &RwLock<Vec<T>>, callback: T) {
    match lock.write() {
        Ok(mut callbacks) => callbacks.push(callback),
        Err(poisoned) => poisoned.into_inner().push(callback),
    }
}

/// Sequential hook whose callbacks may transform the payload
pub struct MutableHook<P> {
    callbacks: RwLock<Vec<MutableCallback<P>>>,
}

impl<P: Send + 'static> MutableHook<P> {
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback
    pub fn tap<F, Fut>(&self, callback: F)
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P>> + Send + 'static,
    {
        let callback: MutableCallback<P> = Arc::new(move |payload| Box::pin(callback(payload)));
        push(&self.callbacks, callback);
    }

    pub fn has_observers(&self) -> bool {
        !snapshot(&self.callbacks).is_empty()
    }

    /// Run every callback in registration order, threading the payload through
    ///
    /// Stops at the first error.
    pub async fn invoke(&self, payload: P) -> Result<P> {
        let mut payload = payload;
        for callback in snapshot(&self.callbacks) {
            payload = callback(payload).await?;
        }
        Ok(payload)
    }
}

impl<P: Send + 'static> Default for MutableHook<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for MutableHook<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableHook")
            .field("callbacks", &snapshot(&self.callbacks).len())
            .finish()
    }
}

/// Concurrent hook; callbacks observe a shared argument and may return a value
pub struct ObserverHook<A, R = ()> {
    callbacks: RwLock<Vec<ObserverCallback<A, R>>>,
}

impl<A, R> ObserverHook<A, R>
where
    A: Clone + Send + 'static,
    R: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback
    pub fn tap<F, Fut>(&self, callback: F)
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let callback: ObserverCallback<A, R> = Arc::new(move |arg| Box::pin(callback(arg)));
        push(&self.callbacks, callback);
    }

    pub fn has_observers(&self) -> bool {
        !snapshot(&self.callbacks).is_empty()
    }

    /// Run every callback concurrently and settle all of them
    ///
    /// Outcomes are returned in registration order.
    pub async fn invoke(&self, arg: A) -> Vec<Result<R>> {
        let callbacks = snapshot(&self.callbacks);
        join_all(callbacks.iter().map(|callback| callback(arg.clone()))).await
    }

    /// Like [`invoke`](Self::invoke), but surfaces the first error once all
    /// callbacks have settled
    pub async fn invoke_all(&self, arg: A) -> Result<Vec<R>> {
        self.invoke(arg).await.into_iter().collect()
    }
}

impl<A, R> Default for ObserverHook<A, R>
where
    A: Clone + Send + 'static,
    R: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R> fmt::Debug for ObserverHook<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverHook")
            .field("callbacks", &snapshot(&self.callbacks).len())
            .finish()
    }
}
