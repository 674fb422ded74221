//! Azure DevOps REST API client for azure-devops-mcp.
//!
//! - [`AuthManager`] signs requests with a PAT (Basic) or an Azure AD bearer token.
//! - [`OAuthHandler`] runs the client-credentials exchange and fills a shared [`TokenCache`].
//! - [`AzureDevOpsClient`] maps each REST operation to one request (two for branch
//!   creation) and returns the upstream JSON untouched.

mod auth;
mod client;
mod oauth;
mod types;

pub use auth::{AuthManager, AuthMode};
pub use client::{AzureDevOpsClient, ServiceUrls, API_VERSION};
pub use oauth::{OAuthHandler, TokenCache, AZURE_DEVOPS_SCOPE};
pub use types::*;
