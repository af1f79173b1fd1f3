use std::io;
use thiserror::Error;

/// Every fallible operation below the command line reports one of these.
#[derive(Debug, Error)]
pub enum DroneError {
    /// Upstream listing, registry or download failure.
    #[error("{0}")]
    Fetch(String),

    #[error("Unable to get version from drone cli version check: {output}")]
    VersionParse { output: String },

    #[error("Failed to extract {archive}: {message}")]
    Extract { archive: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No stable release found for {owner}/{repo}")]
    NoStableRelease { owner: String, repo: String },

    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, DroneError>;

impl From<reqwest::Error> for DroneError {
    fn from(e: reqwest::Error) -> Self {
        DroneError::Fetch(e.to_string())
    }
}
