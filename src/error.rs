use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    ConfigValidation(String),

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("review api error: {0}")]
    ReviewApi(String),

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("prompt error: {0}")]
    Prompt(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("a run is already in progress")]
    RunInProgress,
}

pub type Result<T> = std::result::Result<T, Error>;
