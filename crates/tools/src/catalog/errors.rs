use thiserror::Error;

/// Errors from the warehouse and model collaborators.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("client not initialized: {0}")]
    Unavailable(String),
    #[error("network: {0}")]
    Network(String),
    #[error("api: {0}")]
    Api(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
