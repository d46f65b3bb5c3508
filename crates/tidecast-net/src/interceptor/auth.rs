//! Bearer token injection.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::Interceptor;
use crate::error::Result;
use crate::request::RequestDescriptor;

/// Source of access tokens.
///
/// `None` means "no token right now" and is not an error; the request goes
/// out unauthenticated and the server decides.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Obtain the current token, refreshing it if needed.
    async fn token(&self) -> Option<String>;
}

/// A token held in memory and replaced by the application on sign-in/out.
#[derive(Debug, Default)]
pub struct StaticToken {
    token: RwLock<Option<String>>,
}

impl StaticToken {
    /// Hold the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Hold no token.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Replace the token.
    pub fn set(&self, token: Option<String>) {
        *self.token.write() = token;
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Option<String> {
        self.token.read().clone()
    }
}

/// Attaches `Authorization: Bearer <token>` when a token is available.
#[derive(Clone)]
pub struct AuthInterceptor {
    provider: Arc<dyn TokenProvider>,
}

impl AuthInterceptor {
    /// Use the given token source.
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self { provider }
    }
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInterceptor").finish_non_exhaustive()
    }
}

#[async_trait]
impl Interceptor for AuthInterceptor {
    fn name(&self) -> &str {
        "auth"
    }

    async fn on_request(&self, request: RequestDescriptor) -> Result<RequestDescriptor> {
        match self.provider.token().await {
            Some(token) if !token.is_empty() => {
                Ok(request.with_header("authorization", format!("Bearer {token}")))
            }
            _ => Ok(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attaches_bearer_header() {
        let interceptor = AuthInterceptor::new(Arc::new(StaticToken::new("abc123")));
        let request = interceptor
            .on_request(RequestDescriptor::get("/me"))
            .await
            .unwrap();
        assert_eq!(request.header("Authorization"), Some("Bearer abc123"));
    }

    #[tokio::test]
    async fn test_missing_token_is_noop() {
        let tokens = Arc::new(StaticToken::empty());
        let interceptor = AuthInterceptor::new(tokens.clone());
        let original = RequestDescriptor::get("/me");

        let request = interceptor.on_request(original.clone()).await.unwrap();
        assert_eq!(request, original);

        tokens.set(Some("later".into()));
        let request = interceptor.on_request(original).await.unwrap();
        assert_eq!(request.header("authorization"), Some("Bearer later"));
    }
}
