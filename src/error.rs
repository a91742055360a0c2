use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReconError>;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Rule table error: {0}")]
    RuleTable(String),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("{what} not found: {}", .path.display())]
    MissingInput { what: String, path: PathBuf },

    #[error("No source found: {0}")]
    NoSource(String),

    #[error("External tool `{tool}` failed: {reason}")]
    ExternalTool { tool: String, reason: String },

    #[error("Reporting error: {0}")]
    Reporting(String),
}

impl ReconError {
    pub fn missing(what: &str, path: impl Into<PathBuf>) -> Self {
        ReconError::MissingInput {
            what: what.to_string(),
            path: path.into(),
        }
    }

    /// Process exit status for this error.
    ///
    /// 2 covers usage problems and "nothing to work on", 3 a referenced input
    /// file that does not exist, 4 a rule table that could not be loaded.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReconError::Usage(_) | ReconError::NoSource(_) => 2,
            ReconError::MissingInput { .. } => 3,
            ReconError::RuleTable(_) => 4,
            _ => 1,
        }
    }
}

impl From<toml::de::Error> for ReconError {
    fn from(err: toml::de::Error) -> Self {
        ReconError::RuleTable(format!("TOML error: {}", err))
    }
}
