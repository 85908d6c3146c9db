//! The `ping` tool.

use mcp::CallResult;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::registry::Tool;

pub const TOOL_NAME: &str = "ping";

/// Takes no arguments.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct PingRequest {}

pub fn tool() -> Tool {
    Tool::new(
        TOOL_NAME,
        "A simple tool to check server responsiveness.",
        |_| async {
            tracing::info!("Ping tool called.");
            Ok(CallResult::success("pong"))
        },
    )
    .with_input::<PingRequest>()
}
