use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Communication failure: {0}")]
    Communication(String),

    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MeshError>;
