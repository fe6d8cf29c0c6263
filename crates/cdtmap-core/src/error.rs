use thiserror::Error;

#[derive(Error, Debug)]
pub enum CdtMapError {
    #[error("Error connecting to Ollama: {0}")]
    Transport(String),

    #[error("Ollama returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CdtMapError>;
