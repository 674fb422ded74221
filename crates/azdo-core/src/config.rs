//! Configuration management for azure-devops-mcp.
//!
//! Handles loading and saving configuration from TOML files.
//! Config files are stored in platform-specific locations:
//!
//! - **macOS/Linux**: `~/.config/azure-devops-mcp/config.toml`
//! - **Windows**: `%APPDATA%\azure-devops-mcp\config.toml`
//!
//! The file only ever holds non-secret identifiers. PATs and client
//! secrets live in the environment or the OS keychain.
//!
//! # Example
//!
//! ```ignore
//! use azdo_core::config::Config;
//!
//! let mut config = Config::load()?;
//! config.set("azure_devops.organization", "contoso")?;
//! config.save()?;
//! ```

use crate::credentials::{names, SecretLookup};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// Config file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config directory name.
const CONFIG_DIR_NAME: &str = "azure-devops-mcp";

/// Default Azure AD authority.
pub const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";

/// Default bind address for the HTTP transport.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port for the HTTP transport.
pub const DEFAULT_PORT: u16 = 8000;

/// Keys accepted by [`Config::get`] and [`Config::set`].
pub const KEYS: [&str; 7] = [
    "azure_devops.organization",
    "oauth.tenant_id",
    "oauth.client_id",
    "oauth.authority_url",
    "server.transport",
    "server.host",
    "server.port",
];

// =============================================================================
// Configuration structures
// =============================================================================

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_devops: Option<AzureDevOpsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
}

/// Azure DevOps organization settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureDevOpsConfig {
    /// Organization name (`https://dev.azure.com/{organization}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

/// Azure AD application settings for the client-credentials flow.
///
/// The client secret is deliberately absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Authority override (sovereign clouds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_url: Option<String>,
}

/// MCP transport defaults for `azdo serve`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// `stdio` or `http`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

// =============================================================================
// Config implementation
// =============================================================================

impl Config {
    /// Get the configuration directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(CONFIG_DIR_NAME))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default location.
    ///
    /// Returns a default (empty) config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    ///
    /// Returns a default (empty) config if the file doesn't exist.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!(path = ?path, "Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        debug!(path = ?path, "Loading config");

        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        info!(path = ?path, "Config loaded successfully");
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        debug!(path = ?path, "Saving config");

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        info!(path = ?path, "Config saved successfully");
        Ok(())
    }

    /// Configured organization, if any.
    pub fn organization(&self) -> Option<&str> {
        self.azure_devops
            .as_ref()
            .and_then(|c| c.organization.as_deref())
    }

    /// Authority URL for token requests, falling back to the public cloud.
    pub fn authority_url(&self) -> &str {
        self.oauth
            .as_ref()
            .and_then(|c| c.authority_url.as_deref())
            .unwrap_or(DEFAULT_AUTHORITY_URL)
    }

    /// Set a configuration value by key path.
    ///
    /// Key format: `section.field` (e.g., `azure_devops.organization`, `server.port`)
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let (section, field) = split_key(key)?;
        let value = value.to_string();

        match section {
            "azure_devops" => {
                let config = self.azure_devops.get_or_insert_with(Default::default);
                match field {
                    "organization" | "org" => config.organization = Some(value),
                    _ => return Err(unknown_field("azure_devops", field)),
                }
            }
            "oauth" => {
                let config = self.oauth.get_or_insert_with(Default::default);
                match field {
                    "tenant_id" | "tenant" => config.tenant_id = Some(value),
                    "client_id" | "client" => config.client_id = Some(value),
                    "authority_url" | "authority" => config.authority_url = Some(value),
                    "client_secret" => {
                        return Err(Error::Config(
                            "Client secret is not stored in the config file. Use `azdo secrets set AZURE_AD_CLIENT_SECRET <value>`".to_string(),
                        ))
                    }
                    _ => return Err(unknown_field("oauth", field)),
                }
            }
            "server" => {
                let config = self.server.get_or_insert_with(Default::default);
                match field {
                    "transport" => match value.as_str() {
                        "stdio" | "http" => config.transport = Some(value),
                        other => {
                            return Err(Error::Config(format!(
                                "Invalid transport '{}'. Expected 'stdio' or 'http'",
                                other
                            )))
                        }
                    },
                    "host" => config.host = Some(value),
                    "port" => {
                        let port = value.parse::<u16>().map_err(|_| {
                            Error::Config(format!("Invalid port '{}'", value))
                        })?;
                        config.port = Some(port);
                    }
                    _ => return Err(unknown_field("server", field)),
                }
            }
            _ => return Err(Error::Config(format!("Unknown config section: {}", section))),
        }

        Ok(())
    }

    /// Get a configuration value by key path.
    ///
    /// Key format: `section.field` (e.g., `oauth.tenant_id`)
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let (section, field) = split_key(key)?;

        match section {
            "azure_devops" => {
                let Some(config) = &self.azure_devops else {
                    return Ok(None);
                };
                match field {
                    "organization" | "org" => Ok(config.organization.clone()),
                    _ => Err(unknown_field("azure_devops", field)),
                }
            }
            "oauth" => {
                let Some(config) = &self.oauth else {
                    return Ok(None);
                };
                match field {
                    "tenant_id" | "tenant" => Ok(config.tenant_id.clone()),
                    "client_id" | "client" => Ok(config.client_id.clone()),
                    "authority_url" | "authority" => Ok(config.authority_url.clone()),
                    _ => Err(unknown_field("oauth", field)),
                }
            }
            "server" => {
                let Some(config) = &self.server else {
                    return Ok(None);
                };
                match field {
                    "transport" => Ok(config.transport.clone()),
                    "host" => Ok(config.host.clone()),
                    "port" => Ok(config.port.map(|p| p.to_string())),
                    _ => Err(unknown_field("server", field)),
                }
            }
            _ => Err(Error::Config(format!("Unknown config section: {}", section))),
        }
    }
}

fn split_key(key: &str) -> Result<(&str, &str)> {
    match key.split_once('.') {
        Some((section, field)) if !section.is_empty() && !field.is_empty() && !field.contains('.') => {
            Ok((section, field))
        }
        _ => Err(Error::Config(format!(
            "Invalid config key '{}'. Expected format: section.field",
            key
        ))),
    }
}

fn unknown_field(section: &str, field: &str) -> Error {
    Error::Config(format!("Unknown {} config field: {}", section, field))
}

/// The config file answers non-secret identifiers only.
impl SecretLookup for Config {
    fn lookup(&self, name: &str) -> Result<Option<String>> {
        let value = match name {
            names::ORGANIZATION => self.organization().map(String::from),
            names::CLIENT_ID => self.oauth.as_ref().and_then(|c| c.client_id.clone()),
            names::TENANT_ID => self.oauth.as_ref().and_then(|c| c.tenant_id.clone()),
            _ => None,
        };
        Ok(value)
    }
}

// =============================================================================
// Tests
// =============================================================================
