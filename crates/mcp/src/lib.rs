//! MCP (Model Context Protocol) server and client library.
//!
//! This crate speaks newline-delimited JSON-RPC 2.0, the framing MCP uses
//! over stdio, on any byte stream: stdio, TCP, or an in-process pipe.
//!
//! - [`serve`] and friends answer `initialize`, `ping`, `tools/list`,
//!   `tools/call`, `prompts/list` and `prompts/get` on behalf of a
//!   [`ToolService`].
//! - [`Client`] connects to a server, discovers tools and invokes them.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{CallResult, Client};
//! use serde_json::json;
//!
//! # async fn example() -> mcp::Result<()> {
//! let client = Client::connect_tcp("127.0.0.1:8000").await?;
//!
//! for name in client.discover().await? {
//!     println!("Tool: {name}");
//! }
//!
//! let result = client
//!     .invoke("calculate", Some(json!({"number1": 10, "number2": 5, "operation": "add"})))
//!     .await?;
//! assert_eq!(result, CallResult::success("15"));
//!
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod framing;
mod protocol;
mod server;

pub use client::{Client, DEFAULT_TIMEOUT, MAX_OUTPUT_SIZE, ServerConfig};
pub use error::{Error, Result};
pub use protocol::{
    CallResult, CallToolParams, CallToolResult, EmbeddedResource, GetPromptParams,
    GetPromptResult, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListPromptsResult, ListToolsResult, PROTOCOL_VERSION, Prompt,
    PromptArgument, PromptMessage, PromptsCapability, RequestId, ServerCapabilities, ServerInfo,
    Tool, ToolContent,
};
pub use server::{MAX_REQUEST_SIZE, ToolService, serve, serve_listener, serve_stdio, serve_tcp};
