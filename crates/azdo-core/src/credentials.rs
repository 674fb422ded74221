//! Credential resolution.
//!
//! Turns named configuration sources into a [`CredentialConfig`]:
//!
//! 1. Organization and PAT come from the environment first.
//! 2. Anything still missing is looked up through an optional secret
//!    collaborator (OS keychain, config file, ...). Lookup failures are
//!    treated as "not found".
//! 3. A missing organization is fatal. A missing PAT is not: OAuth client
//!    credentials may cover it, and the signer reports the gap on first use.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::debug;

use crate::{Error, Result};

/// Well-known secret and environment variable names.
pub mod names {
    /// Azure DevOps organization name.
    pub const ORGANIZATION: &str = "AZURE_DEVOPS_ORG";
    /// Personal Access Token.
    pub const PAT: &str = "AZURE_DEVOPS_PAT";
    /// Azure AD application (client) id.
    pub const CLIENT_ID: &str = "AZURE_AD_CLIENT_ID";
    /// Azure AD application secret.
    pub const CLIENT_SECRET: &str = "AZURE_AD_CLIENT_SECRET";
    /// Azure AD tenant id.
    pub const TENANT_ID: &str = "AZURE_AD_TENANT_ID";

    /// Every name the resolver reads.
    pub const ALL: [&str; 5] = [ORGANIZATION, PAT, CLIENT_ID, CLIENT_SECRET, TENANT_ID];

    /// Secrets every tool declares as required.
    pub const REQUIRED: [&str; 2] = [ORGANIZATION, PAT];

    /// Whether `name` holds secret material (never printed, never stored in plain files).
    pub fn is_secret(name: &str) -> bool {
        matches!(name, PAT | CLIENT_SECRET)
    }
}

// =============================================================================
// Secret lookup seam
// =============================================================================

/// A named source of configuration values.
///
/// `Ok(None)` means the source has no value for `name`; `Err` means the
/// source itself failed (locked keychain, unreadable file, ...).
pub trait SecretLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Result<Option<String>>;
}

/// Process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvLookup;

impl SecretLookup for EnvLookup {
    fn lookup(&self, name: &str) -> Result<Option<String>> {
        Ok(std::env::var(name).ok())
    }
}

impl SecretLookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Result<Option<String>> {
        Ok(self.get(name).cloned())
    }
}

/// Ordered list of lookups; the first source with a value wins.
#[derive(Default, Clone)]
pub struct SecretChain {
    sources: Vec<Arc<dyn SecretLookup>>,
}

impl SecretChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source with lower priority than the existing ones.
    pub fn with(mut self, source: Arc<dyn SecretLookup>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl SecretLookup for SecretChain {
    /// A failing source is skipped; its error surfaces only when no later
    /// source has a value.
    fn lookup(&self, name: &str) -> Result<Option<String>> {
        let mut first_error = None;

        for source in &self.sources {
            match source.lookup(name) {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {}
                Err(e) => {
                    debug!(name = name, error = %e, "Secret source failed, trying next");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Credential configuration
// =============================================================================

/// Azure AD client-credentials triple.
#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub tenant_id: String,
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// Resolved configuration for one client.
#[derive(Clone)]
pub struct CredentialConfig {
    /// Organization name; never empty.
    pub organization: String,
    pub pat: Option<SecretString>,
    pub oauth: Option<OAuthCredentials>,
}

impl CredentialConfig {
    /// Create a PAT-only configuration.
    pub fn with_pat(organization: impl Into<String>, pat: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            pat: Some(SecretString::from(pat.into())),
            oauth: None,
        }
    }

    /// Create an OAuth-only configuration.
    pub fn with_oauth(organization: impl Into<String>, oauth: OAuthCredentials) -> Self {
        Self {
            organization: organization.into(),
            pat: None,
            oauth: Some(oauth),
        }
    }

    pub fn has_pat(&self) -> bool {
        self.pat.is_some()
    }

    pub fn has_oauth(&self) -> bool {
        self.oauth.is_some()
    }
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("organization", &self.organization)
            .field("pat", &self.pat.as_ref().map(|_| "[REDACTED]"))
            .field("oauth", &self.oauth)
            .finish()
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves [`CredentialConfig`] from the environment plus an optional
/// secret collaborator.
#[derive(Clone)]
pub struct CredentialResolver {
    env: Arc<dyn SecretLookup>,
    secrets: Option<Arc<dyn SecretLookup>>,
}

impl CredentialResolver {
    /// Resolver over the process environment only.
    pub fn from_env() -> Self {
        Self::new(Arc::new(EnvLookup))
    }

    /// Resolver over a custom environment source.
    pub fn new(env: Arc<dyn SecretLookup>) -> Self {
        Self { env, secrets: None }
    }

    /// Attach the fallback secret collaborator.
    pub fn with_secrets(mut self, secrets: Arc<dyn SecretLookup>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Resolve the configuration.
    ///
    /// Fails with [`Error::Config`] only when no source knows the organization.
    pub fn resolve(&self) -> Result<CredentialConfig> {
        let mut organization = read(self.env.as_ref(), names::ORGANIZATION);
        let mut pat = read(self.env.as_ref(), names::PAT);

        if organization.is_none() || pat.is_none() {
            if let Some(secrets) = &self.secrets {
                if organization.is_none() {
                    organization = read(secrets.as_ref(), names::ORGANIZATION);
                }
                if pat.is_none() {
                    pat = read(secrets.as_ref(), names::PAT);
                }
            }
        }

        let Some(organization) = organization else {
            return Err(Error::Config(format!(
                "{} not found in environment or secret store",
                names::ORGANIZATION
            )));
        };

        let oauth = self.resolve_oauth();

        debug!(
            organization = %organization,
            has_pat = pat.is_some(),
            has_oauth = oauth.is_some(),
            "Resolved credential configuration"
        );

        Ok(CredentialConfig {
            organization,
            pat: pat.map(SecretString::from),
            oauth,
        })
    }

    fn resolve_oauth(&self) -> Option<OAuthCredentials> {
        let field = |name: &str| {
            read(self.env.as_ref(), name).or_else(|| {
                self.secrets
                    .as_ref()
                    .and_then(|secrets| read(secrets.as_ref(), name))
            })
        };

        let client_id = field(names::CLIENT_ID)?;
        let client_secret = field(names::CLIENT_SECRET)?;
        let tenant_id = field(names::TENANT_ID)?;

        Some(OAuthCredentials {
            client_id,
            client_secret: SecretString::from(client_secret),
            tenant_id,
        })
    }
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Read a non-blank value, swallowing source failures.
fn read(source: &dyn SecretLookup, name: &str) -> Option<String> {
    match source.lookup(name) {
        Ok(value) => value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()),
        Err(e) => {
            debug!(name = name, error = %e, "Secret lookup failed, treating as not found");
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
