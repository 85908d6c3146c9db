use thiserror::Error;

/// Errors raised while registering or running tools.
///
/// Handler-level variants display as their bare message, because that text is
/// what the caller sees in a failure result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unknown prompt: {0}")]
    UnknownPrompt(String),

    #[error("tool already registered: {0}")]
    DuplicateName(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    CollaboratorUnavailable(String),

    #[error("tool execution failed: {0}")]
    Execution(String),
}

pub type Result<T> = std::result::Result<T, ToolError>;
