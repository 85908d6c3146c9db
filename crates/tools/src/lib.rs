//! Tools served by the workshop examples.
//!
//! A [`ToolRegistry`] maps names to async handlers and implements
//! [`mcp::ToolService`], so it can be handed straight to [`mcp::serve`].
//! It can also carry [`PromptTemplate`]s, served through `prompts/get`:
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! let registry = tools::demos::calculator()?;
//! mcp::serve_tcp(Arc::new(registry), "127.0.0.1:8080").await?;
//! # Ok(())
//! # }
//! ```

pub mod calculator;
pub mod catalog;
pub mod demos;
mod error;
pub mod ping;
mod registry;

pub use error::{Result, ToolError};
pub use registry::{
    Arguments, HandlerFuture, PromptArguments, PromptTemplate, Tool, ToolRegistry, parse_arguments,
};
