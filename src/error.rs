use thiserror::Error;

#[derive(Error, Debug)]
pub enum FfdeckError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid options: {0}")]
    Validation(String),

    #[error("Another operation is already running")]
    Busy,

    #[error("Process exited with code {code}")]
    ProcessFailure {
        code: i32,
        /// Last diagnostic lines emitted before exit
        tail: Vec<String>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Media inspection failed: {0}")]
    Probe(String),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FfdeckError {
    pub(crate) fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, FfdeckError>;
