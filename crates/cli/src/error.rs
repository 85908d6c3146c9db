//! CLI error types.

use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration could not be read or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The protocol layer failed (connect, handshake, transport).
    #[error(transparent)]
    Mcp(#[from] mcp::Error),

    /// A registry could not be assembled.
    #[error(transparent)]
    Tool(#[from] tools::ToolError),

    /// Caller output could not be written.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
