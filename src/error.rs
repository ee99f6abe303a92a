use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::RecordKind;

#[derive(Debug, Error, Diagnostic)]
pub enum TrackerError {
    #[error("missing config file config.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("no 'Users' entry in config")]
    #[diagnostic(help("add a \"Users\" object mapping account names to API keys"))]
    NoUsers,

    #[error("GW2 API request failed: {0}")]
    ApiHttp(String),

    #[error("GW2 API returned status {status}: {message}")]
    ApiStatus { status: u16, message: String },

    #[error("GW2 API rate limit reached while fetching {0}")]
    RateLimited(String),

    #[error("GW2 API omitted {} requested {kind} record(s): {}", .missing.len(), .missing.join(", "))]
    IncompleteBatch {
        kind: RecordKind,
        missing: Vec<String>,
    },

    #[error("batch of {size} ids exceeds the API limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to write report: {0}")]
    ReportWrite(String),
}

impl TrackerError {
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            TrackerError::MissingConfig
                | TrackerError::ConfigRead(_)
                | TrackerError::ConfigParse(_)
                | TrackerError::NoUsers
        )
    }

    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            TrackerError::ApiHttp(_)
                | TrackerError::ApiStatus { .. }
                | TrackerError::RateLimited(_)
                | TrackerError::IncompleteBatch { .. }
                | TrackerError::BatchTooLarge { .. }
        )
    }
}
