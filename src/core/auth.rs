//! Caller identity and permission scopes
//!
//! Authentication itself lives outside the framework. An [`AuthProvider`]
//! turns request headers into an [`AuthContext`], which route permission
//! checks and access hooks then consult.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::http::HeaderMap;

/// Authorization context extracted from a request
#[derive(Debug, Clone, PartialEq)]
pub enum AuthContext {
    /// Authenticated user holding a set of permission scopes
    User { user_id: String, scopes: Vec<String> },

    /// Privileged caller, bypasses scope and access checks
    Super { user_id: String },

    /// No authentication
    Anonymous,
}

impl AuthContext {
    /// Check if context has unrestricted access
    pub fn is_super(&self) -> bool {
        matches!(self, AuthContext::Super { .. })
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, AuthContext::Anonymous)
    }

    /// Get user_id if available
    pub fn user_id(&self) -> Option<&str> {
        match self {
            AuthContext::User { user_id, .. } | AuthContext::Super { user_id } => Some(user_id),
            AuthContext::Anonymous => None,
        }
    }

    /// Scopes from `required` that this caller lacks
    pub fn missing_scopes(&self, required: &[String]) -> Vec<String> {
        match self {
            AuthContext::Super { .. } => Vec::new(),
            AuthContext::User { scopes, .. } => required
                .iter()
                .filter(|s| !scopes.contains(s))
                .cloned()
                .collect(),
            AuthContext::Anonymous => required.to_vec(),
        }
    }

    /// Check that every required scope is held
    pub fn has_scopes(&self, required: &[String]) -> bool {
        self.missing_scopes(required).is_empty()
    }
}

/// Trait for auth providers
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Extract auth context from the request headers
    async fn extract_context(&self, headers: &HeaderMap) -> Result<AuthContext>;
}

/// Default no-auth provider (for development)
pub struct NoAuthProvider;

#[async_trait]
impl AuthProvider for NoAuthProvider {
    async fn extract_context(&self, _headers: &HeaderMap) -> Result<AuthContext> {
        Ok(AuthContext::Anonymous)
    }
}

/// Provider trusting identity headers set by an upstream gateway
///
/// - `x-user-id`: caller id (absent means anonymous)
/// - `x-scopes`: comma or space separated scopes
/// - `x-super`: `true` marks the caller as privileged
pub struct HeaderAuthProvider;

impl HeaderAuthProvider {
    pub const USER_HEADER: &'static str = "x-user-id";
    pub const SCOPES_HEADER: &'static str = "x-scopes";
    pub const SUPER_HEADER: &'static str = "x-super";
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map(str::trim)
                .map_err(|_| anyhow!("Invalid {} header", name))
        })
        .transpose()
}

#[async_trait]
impl AuthProvider for HeaderAuthProvider {
    async fn extract_context(&self, headers: &HeaderMap) -> Result<AuthContext> {
        let Some(user_id) = header_str(headers, Self::USER_HEADER)?.filter(|s| !s.is_empty()) else {
            return Ok(AuthContext::Anonymous);
        };
        let user_id = user_id.to_string();

        if header_str(headers, Self::SUPER_HEADER)? == Some("true") {
            return Ok(AuthContext::Super { user_id });
        }

        let scopes = header_str(headers, Self::SCOPES_HEADER)?
            .map(|s| {
                s.split([',', ' '])
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(AuthContext::User { user_id, scopes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn user(scopes: &[&str]) -> AuthContext {
        AuthContext::User {
            user_id: "u1".into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_missing_scopes() {
        let required = vec!["read:logs".to_string(), "write:logs".to_string()];
        assert_eq!(user(&["read:logs"]).missing_scopes(&required), vec!["write:logs"]);
        assert!(user(&["read:logs", "write:logs"]).has_scopes(&required));
        assert!(
            AuthContext::Super {
                user_id: "root".into()
            }
            .has_scopes(&required)
        );
        assert_eq!(AuthContext::Anonymous.missing_scopes(&required), required);
    }

    #[test]
    fn test_user_id() {
        assert_eq!(user(&[]).user_id(), Some("u1"));
        assert_eq!(AuthContext::Anonymous.user_id(), None);
    }

    #[tokio::test]
    async fn test_no_auth_provider_is_anonymous() {
        let ctx = NoAuthProvider.extract_context(&HeaderMap::new()).await.unwrap();
        assert!(ctx.is_anonymous());
    }

    #[tokio::test]
    async fn test_header_provider_user() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("alice"));
        headers.insert("x-scopes", HeaderValue::from_static("read:logs, write:logs"));

        let ctx = HeaderAuthProvider.extract_context(&headers).await.unwrap();
        assert_eq!(ctx, user_named("alice", &["read:logs", "write:logs"]));
    }

    #[tokio::test]
    async fn test_header_provider_super_and_anonymous() {
        let mut headers = HeaderMap::new();
        assert!(
            HeaderAuthProvider
                .extract_context(&headers)
                .await
                .unwrap()
                .is_anonymous()
        );

        headers.insert("x-user-id", HeaderValue::from_static("root"));
        headers.insert("x-super", HeaderValue::from_static("true"));
        assert!(HeaderAuthProvider.extract_context(&headers).await.unwrap().is_super());
    }

    fn user_named(id: &str, scopes: &[&str]) -> AuthContext {
        AuthContext::User {
            user_id: id.into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }
}
