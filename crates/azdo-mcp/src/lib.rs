//! MCP (Model Context Protocol) server for the Azure DevOps REST API.
//!
//! Exposes every Azure DevOps operation of `azdo-api` as an MCP tool over
//! stdio or HTTP.

pub mod handlers;
pub mod http;
pub mod protocol;
pub mod server;
pub mod transport;

pub use handlers::ToolHandler;
pub use http::HttpTransport;
pub use protocol::{ToolCallResult, ToolDefinition};
pub use server::McpServer;
pub use transport::StdioTransport;
