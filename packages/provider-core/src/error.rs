use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Actor not found at slot {0}")]
    ActorNotFound(u16),

    #[error("Source for {0} could not be read: {1}")]
    SourceUnreadable(String, String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
