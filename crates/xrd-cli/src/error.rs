use std::path::PathBuf;
use thiserror::Error;
use xrdpp::core::pattern::PatternError;
use xrdpp::engine::error::EngineError;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file '{path}': {source}", path = path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid crystal file '{path}': {source}", path = path.display())]
    CrystalFile {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid pattern file '{path}': {source}", path = path.display())]
    PatternFile {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write CSV output: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to install logger: {0}")]
    Logging(String),

    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
