//! Core error handling, configuration, and credential resolution for azure-devops-mcp.
//!
//! This crate provides the foundational pieces shared by the API client,
//! the MCP server, and the CLI.

pub mod config;
pub mod credentials;
pub mod error;

pub use config::Config;
pub use credentials::{
    CredentialConfig, CredentialResolver, EnvLookup, OAuthCredentials, SecretChain, SecretLookup,
};
pub use error::{Error, Result};
