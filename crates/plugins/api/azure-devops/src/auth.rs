//! Request signing.
//!
//! A PAT always wins. Without one, a cached Azure AD bearer token is used;
//! the async path mints one on demand when client credentials are configured.

use std::sync::Arc;

use azdo_core::{CredentialConfig, Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::oauth::{OAuthHandler, TokenCache};

const NO_CREDENTIALS: &str =
    "No valid credentials configured. Set AZURE_DEVOPS_PAT or configure Azure AD client credentials.";

/// Active authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Personal Access Token, sent as Basic auth
    Pat,
    /// Azure AD bearer token
    OAuth,
    /// Nothing usable
    None,
}

/// Produces `Authorization` header values for one resolved configuration.
pub struct AuthManager {
    config: CredentialConfig,
    oauth: Option<OAuthHandler>,
    cache: Arc<TokenCache>,
}

impl AuthManager {
    /// Create a signer sharing `cache` with every other signer in the process.
    pub fn new(config: CredentialConfig, cache: Arc<TokenCache>) -> Result<Self> {
        let oauth = match &config.oauth {
            Some(credentials) => Some(OAuthHandler::new(credentials.clone(), cache.clone())?),
            None => None,
        };

        Ok(Self {
            config,
            oauth,
            cache,
        })
    }

    /// Point the OAuth exchange at a different authority.
    pub fn with_authority(mut self, authority_url: impl Into<String>) -> Self {
        self.oauth = self
            .oauth
            .map(|handler| handler.with_authority(authority_url));
        self
    }

    pub fn organization(&self) -> &str {
        &self.config.organization
    }

    pub fn mode(&self) -> AuthMode {
        if self.config.pat.is_some() {
            AuthMode::Pat
        } else if self.oauth.is_some() || !self.cache.is_empty() {
            AuthMode::OAuth
        } else {
            AuthMode::None
        }
    }

    /// Whether a header can be produced without first contacting Azure AD.
    pub fn has_valid_credentials(&self) -> bool {
        self.config.pat.is_some() || !self.cache.is_empty()
    }

    /// Header value from what is already at hand. Never mints a token.
    pub fn authorization(&self) -> Result<SecretString> {
        if let Some(pat) = &self.config.pat {
            return Ok(basic(pat));
        }

        if let Some(token) = self.cache.get() {
            return Ok(bearer(&token));
        }

        Err(Error::Auth(NO_CREDENTIALS.to_string()))
    }

    /// Header value, minting a bearer token when needed and possible.
    pub async fn authorization_async(&self) -> Result<SecretString> {
        if let Some(pat) = &self.config.pat {
            return Ok(basic(pat));
        }

        if let Some(token) = self.cache.get() {
            return Ok(bearer(&token));
        }

        let Some(oauth) = &self.oauth else {
            return Err(Error::Auth(NO_CREDENTIALS.to_string()));
        };

        debug!("No cached token, running client-credentials exchange");
        match oauth.get_access_token().await {
            Some(token) => Ok(bearer(&token)),
            None => Err(Error::Auth(
                "Failed to acquire Azure AD access token".to_string(),
            )),
        }
    }

    /// Drop the shared cached token.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    /// Drop the shared cached token and mint a new one.
    pub async fn refresh(&self) -> Result<()> {
        let Some(oauth) = &self.oauth else {
            return Err(Error::Auth(
                "Azure AD client credentials are not configured".to_string(),
            ));
        };

        oauth.clear_cache();
        oauth
            .get_access_token()
            .await
            .map(|_| ())
            .ok_or_else(|| Error::Auth("Failed to acquire Azure AD access token".to_string()))
    }
}

fn basic(pat: &SecretString) -> SecretString {
    let encoded = STANDARD.encode(format!(":{}", pat.expose_secret()));
    SecretString::from(format!("Basic {}", encoded))
}

fn bearer(token: &SecretString) -> SecretString {
    SecretString::from(format!("Bearer {}", token.expose_secret()))
}
