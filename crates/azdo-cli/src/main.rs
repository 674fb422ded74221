//! azdo - command-line interface for azure-devops-mcp.

use std::sync::Arc;

use anyhow::Context;
use azdo_core::config::{DEFAULT_HOST, DEFAULT_PORT, KEYS};
use azdo_core::{Config, CredentialResolver, SecretChain, SecretLookup};
use azdo_mcp::{HttpTransport, McpServer, ToolHandler};
use azdo_storage::{CredentialStore, KeychainStore};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "azdo")]
#[command(author, version, about = "Azure DevOps MCP server", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server
    Serve {
        /// Transport to serve on
        #[arg(short, long, value_enum)]
        transport: Option<Transport>,

        /// Address to bind (http transport)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (http transport)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List available tools
    Tools,

    /// Run a single tool and print its result
    Call {
        /// Tool name
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Manage secrets in the OS keychain
    Secrets {
        #[command(subcommand)]
        command: SecretsCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Print the config file location
    Path,
    /// Print one value
    Get { key: String },
    /// Set one value
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum SecretsCommands {
    /// Store a secret (e.g. AZURE_DEVOPS_PAT)
    Set { name: String, value: String },
    /// Remove a secret
    Delete { name: String },
    /// Show which secrets are stored
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

/// Effective `serve` settings after flags, config file and defaults.
#[derive(Debug, PartialEq)]
struct ServeSettings {
    transport: Transport,
    host: String,
    port: u16,
}

impl ServeSettings {
    fn resolve(
        transport: Option<Transport>,
        host: Option<String>,
        port: Option<u16>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let server = config.server.clone().unwrap_or_default();

        let transport = match (transport, server.transport) {
            (Some(t), _) => t,
            (None, Some(name)) => Transport::from_str(&name, true)
                .map_err(|e| anyhow::anyhow!("Invalid server.transport in config: {}", e))?,
            (None, None) => Transport::Stdio,
        };

        Ok(Self {
            transport,
            host: host
                .or(server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: port.or(server.port).unwrap_or(DEFAULT_PORT),
        })
    }
}

/// Fallback sources behind the environment: keychain, then config file.
fn secret_chain(keychain: Arc<dyn SecretLookup>, config: &Config) -> SecretChain {
    SecretChain::new()
        .with(keychain)
        .with(Arc::new(config.clone()))
}

/// Tool handler resolving credentials from env, then keychain, then config.
fn tool_handler(config: &Config) -> ToolHandler {
    let secrets = secret_chain(Arc::new(KeychainStore::new()), config);
    let resolver = CredentialResolver::from_env().with_secrets(Arc::new(secrets));

    ToolHandler::new(resolver).with_authority(config.authority_url())
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    // Stdout belongs to the stdio transport.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Serve {
            transport,
            host,
            port,
        }) => {
            let config = Config::load()?;
            let settings = ServeSettings::resolve(transport, host, port, &config)?;
            let handler = Arc::new(tool_handler(&config));

            match settings.transport {
                Transport::Stdio => McpServer::new(handler).run_stdio().await?,
                Transport::Http => {
                    let listener =
                        tokio::net::TcpListener::bind((settings.host.as_str(), settings.port))
                            .await
                            .with_context(|| {
                                format!("Failed to bind {}:{}", settings.host, settings.port)
                            })?;
                    Arc::new(HttpTransport::new(handler)).serve(listener).await?;
                }
            }
        }
        Some(Commands::Tools) => {
            let config = Config::load()?;
            for tool in tool_handler(&config).available_tools() {
                println!("{:<30} {}", tool.name, tool.description);
            }
        }
        Some(Commands::Call { tool, args }) => {
            let arguments = args
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .context("--args must be a JSON object")?;

            let config = Config::load()?;
            let result = tool_handler(&config).execute(&tool, arguments).await;
            let text = result.first_text().unwrap_or_default();

            if result.is_error() {
                anyhow::bail!("{}", text);
            }
            println!("{}", text);
        }
        Some(Commands::Config { command }) => config_command(command)?,
        Some(Commands::Secrets { command }) => secrets_command(command, &KeychainStore::new())?,
        None => {
            println!("azdo - Azure DevOps MCP server");
            println!("Run with --help for usage information");
        }
    }

    Ok(())
}

fn config_command(command: ConfigCommands) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Show => {
            let config = Config::load()?;
            let text = toml::to_string_pretty(&config).context("Failed to render config")?;
            if text.trim().is_empty() {
                println!("# empty configuration");
            } else {
                print!("{}", text);
            }
        }
        ConfigCommands::Path => {
            println!("{}", Config::config_path()?.display());
        }
        ConfigCommands::Get { key } => match Config::load()?.get(&key)? {
            Some(value) => println!("{}", value),
            None => anyhow::bail!("{} is not set", key),
        },
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value).with_context(|| {
                format!("Valid keys: {}", KEYS.join(", "))
            })?;
            config.save()?;
            tracing::info!("Set {}", key);
        }
    }
    Ok(())
}

fn secrets_command(command: SecretsCommands, store: &dyn CredentialStore) -> anyhow::Result<()> {
    match command {
        SecretsCommands::Set { name, value } => {
            azdo_storage::validate_name(&name)?;
            store.store(&name, &value)?;
            println!("Stored {}", name);
        }
        SecretsCommands::Delete { name } => {
            azdo_storage::validate_name(&name)?;
            store.delete(&name)?;
            println!("Deleted {}", name);
        }
        SecretsCommands::Status => {
            for (name, present) in azdo_storage::status(store) {
                println!("{:<24} {}", name, if present { "set" } else { "not set" });
            }
        }
    }
    Ok(())
}
