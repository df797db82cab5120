use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataForgeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization failed: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Connector {source_id} failed: {message}")]
    Connector { source_id: String, message: String },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

impl DataForgeError {
    pub fn invalid(message: impl Into<String>) -> Self {
        DataForgeError::InvalidRequest(message.into())
    }

    pub fn connector(source_id: &str, message: impl Into<String>) -> Self {
        DataForgeError::Connector {
            source_id: source_id.to_string(),
            message: message.into(),
        }
    }

    /// True for errors the caller caused (bad filter combination, bad state code).
    pub fn is_caller_error(&self) -> bool {
        matches!(self, DataForgeError::InvalidRequest(_))
    }
}

pub type Result<T> = std::result::Result<T, DataForgeError>;
