//! Azure AD client-credentials token exchange.

use std::sync::{Arc, RwLock};

use azdo_core::config::DEFAULT_AUTHORITY_URL;
use azdo_core::{OAuthCredentials, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::client::build_http_client;

/// Azure DevOps resource scope for the client-credentials grant.
pub const AZURE_DEVOPS_SCOPE: &str = "499b84ac-1321-427f-aa17-267ca6975798/.default";

// =============================================================================
// Token cache
// =============================================================================

/// Process-lifetime bearer token slot.
///
/// No expiry tracking. The token is replaced on the next successful
/// exchange and dropped only by [`TokenCache::clear`].
#[derive(Debug, Default)]
pub struct TokenCache {
    token: RwLock<Option<SecretString>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<SecretString> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn store(&self, token: SecretString) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token);
    }

    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn is_empty(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

// =============================================================================
// OAuth handler
// =============================================================================

/// Token endpoint response. Success and failure share one shape.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Acquires Azure DevOps bearer tokens with the client-credentials grant.
pub struct OAuthHandler {
    credentials: OAuthCredentials,
    authority_url: String,
    http: reqwest::Client,
    cache: Arc<TokenCache>,
}

impl OAuthHandler {
    /// Create a handler against the public Azure AD authority.
    pub fn new(credentials: OAuthCredentials, cache: Arc<TokenCache>) -> Result<Self> {
        Ok(Self {
            credentials,
            authority_url: DEFAULT_AUTHORITY_URL.to_string(),
            http: build_http_client()?,
            cache,
        })
    }

    /// Override the authority (sovereign clouds, tests).
    pub fn with_authority(mut self, authority_url: impl Into<String>) -> Self {
        self.authority_url = authority_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `{authority}/{tenant}/oauth2/v2.0/token`
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_url, self.credentials.tenant_id
        )
    }

    /// Run the exchange and cache the token on success.
    ///
    /// Returns `None` on any failure; the reason is logged.
    pub async fn get_access_token(&self) -> Option<SecretString> {
        let url = self.token_url();
        debug!(url = %url, client_id = %self.credentials.client_id, "Requesting Azure AD token");

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.expose_secret()),
            ("scope", AZURE_DEVOPS_SCOPE),
        ];

        let response = match self.http.post(&url).form(&form).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "OAuth token request failed");
                return None;
            }
        };

        let status = response.status().as_u16();
        let body: TokenResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(status = status, error = %e, "OAuth token response could not be parsed");
                return None;
            }
        };

        match body.access_token {
            Some(token) if !token.is_empty() => {
                info!("Acquired Azure AD access token");
                let token = SecretString::from(token);
                self.cache.store(token.clone());
                Some(token)
            }
            _ => {
                warn!(
                    status = status,
                    error = body.error.as_deref().unwrap_or("Unknown error"),
                    error_description = body.error_description.as_deref().unwrap_or("No description"),
                    "OAuth error"
                );
                None
            }
        }
    }

    pub fn get_cached_token(&self) -> Option<SecretString> {
        self.cache.get()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> OAuthCredentials {
        OAuthCredentials {
            client_id: "app-id".to_string(),
            client_secret: SecretString::from("app-secret".to_string()),
            tenant_id: "tenant-id".to_string(),
        }
    }

    #[test]
    fn test_token_cache_lifecycle() {
        let cache = TokenCache::new();
        assert!(cache.is_empty());
        assert!(cache.get().is_none());

        cache.store(SecretString::from("t1".to_string()));
        assert_eq!(cache.get().unwrap().expose_secret(), "t1");

        cache.store(SecretString::from("t2".to_string()));
        assert_eq!(cache.get().unwrap().expose_secret(), "t2");

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_token_url() {
        let handler = OAuthHandler::new(credentials(), Arc::new(TokenCache::new())).unwrap();
        assert_eq!(
            handler.token_url(),
            "https://login.microsoftonline.com/tenant-id/oauth2/v2.0/token"
        );

        let handler = handler.with_authority("https://login.microsoftonline.us/");
        assert_eq!(
            handler.token_url(),
            "https://login.microsoftonline.us/tenant-id/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_cache_is_shared() {
        let cache = Arc::new(TokenCache::new());
        let handler = OAuthHandler::new(credentials(), cache.clone()).unwrap();

        cache.store(SecretString::from("shared".to_string()));
        assert_eq!(handler.get_cached_token().unwrap().expose_secret(), "shared");

        handler.clear_cache();
        assert!(cache.is_empty());
    }

    mod integration {
        use super::*;
        use httpmock::prelude::*;

        fn handler(server: &MockServer, cache: Arc<TokenCache>) -> OAuthHandler {
            OAuthHandler::new(credentials(), cache)
                .unwrap()
                .with_authority(server.base_url())
        }

        #[tokio::test]
        async fn test_exchange_success_caches_token() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/tenant-id/oauth2/v2.0/token")
                    .body_includes("grant_type=client_credentials")
                    .body_includes("client_id=app-id")
                    .body_includes("client_secret=app-secret")
                    .body_includes("scope=499b84ac-1321-427f-aa17-267ca6975798%2F.default");
                then.status(200).json_body(serde_json::json!({
                    "token_type": "Bearer",
                    "expires_in": 3599,
                    "access_token": "eyJ0eXAi"
                }));
            });

            let cache = Arc::new(TokenCache::new());
            let token = handler(&server, cache.clone()).get_access_token().await;

            mock.assert();
            assert_eq!(token.unwrap().expose_secret(), "eyJ0eXAi");
            assert_eq!(cache.get().unwrap().expose_secret(), "eyJ0eXAi");
        }

        #[tokio::test]
        async fn test_exchange_failure_returns_none() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(POST).path("/tenant-id/oauth2/v2.0/token");
                then.status(401).json_body(serde_json::json!({
                    "error": "invalid_client",
                    "error_description": "AADSTS7000215: Invalid client secret provided."
                }));
            });

            let cache = Arc::new(TokenCache::new());
            let token = handler(&server, cache.clone()).get_access_token().await;

            assert!(token.is_none());
            assert!(cache.is_empty());
        }

        #[tokio::test]
        async fn test_exchange_unparseable_body_returns_none() {
            let server = MockServer::start();
            server.mock(|when, then| {
                when.method(POST).path("/tenant-id/oauth2/v2.0/token");
                then.status(502).body("<html>gateway</html>");
            });

            let token = handler(&server, Arc::new(TokenCache::new()))
                .get_access_token()
                .await;
            assert!(token.is_none());
        }

        #[tokio::test]
        async fn test_exchange_network_error_returns_none() {
            let handler = OAuthHandler::new(credentials(), Arc::new(TokenCache::new()))
                .unwrap()
                .with_authority("http://127.0.0.1:1");

            assert!(handler.get_access_token().await.is_none());
        }
    }
}
