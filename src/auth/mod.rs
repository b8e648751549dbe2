//! Bearer-token acquisition for the realtime endpoint.
//!
//! The relay authenticates upstream with either a static `api-key` header or
//! an Entra ID bearer token. This module provides the token side: a
//! [`TokenProvider`] trait plus the client-credentials implementation used in
//! production and a static provider for tests and pre-issued tokens.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// OAuth scope for Azure Cognitive Services resources.
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

/// Errors that can occur while acquiring a bearer token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint could not be reached or returned garbage
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The token endpoint rejected the credentials
    #[error("token endpoint rejected the request with status {status}")]
    Rejected {
        /// HTTP status code returned by the token endpoint
        status: u16,
    },
}

/// Source of fresh bearer tokens.
///
/// Invoked once per outbound connection attempt; implementations decide
/// whether to cache. The relay also invokes it eagerly at session
/// construction so bad credentials fail before any socket is opened.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Produce a bearer token valid for the realtime endpoint.
    async fn token(&self) -> Result<String, AuthError>;
}

// =============================================================================
// Client Credentials Flow
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Entra ID client-credentials token provider.
///
/// Posts to the v2.0 token endpoint of the configured tenant and exchanges
/// the client id/secret for an access token scoped to Cognitive Services.
pub struct ClientCredentialsTokenProvider {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl ClientCredentialsTokenProvider {
    /// Create a provider for the given tenant.
    pub fn new(http: reqwest::Client, tenant_id: &str, client_id: &str, client_secret: &str) -> Self {
        Self::with_token_url(
            http,
            format!("https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token"),
            client_id,
            client_secret,
        )
    }

    /// Create a provider against an explicit token endpoint URL.
    pub fn with_token_url(
        http: reqwest::Client,
        token_url: String,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        Self {
            http,
            token_url,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scope: COGNITIVE_SERVICES_SCOPE.to_string(),
        }
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsTokenProvider {
    async fn token(&self) -> Result<String, AuthError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
            });
        }

        let body: TokenResponse = response.json().await?;
        Ok(body.access_token)
    }
}

// =============================================================================
// Static Tokens
// =============================================================================

/// Provider returning a fixed, pre-issued token. Used in tests and by
/// embedders that manage token refresh themselves.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wrap a pre-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_returns_token() {
        let provider = StaticTokenProvider::new("tok-123");
        assert_eq!(provider.token().await.unwrap(), "tok-123");
    }

    #[test]
    fn test_token_url_layout() {
        let provider = ClientCredentialsTokenProvider::new(
            reqwest::Client::new(),
            "my-tenant",
            "client",
            "secret",
        );
        assert_eq!(
            provider.token_url,
            "https://login.microsoftonline.com/my-tenant/oauth2/v2.0/token"
        );
        assert_eq!(provider.scope, COGNITIVE_SERVICES_SCOPE);
    }
}
