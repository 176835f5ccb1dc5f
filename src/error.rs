use thiserror::Error;

use crate::hubstorage::{HubError, JobKey};

pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Invalid operator input, detected before any remote call.
    #[error("{0}")]
    Config(String),
    #[error("item #{position} of job {job} must have a _key field")]
    MissingKey { job: JobKey, position: u64 },
    #[error(transparent)]
    Remote(#[from] HubError),
}

impl ArchiveError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn code(&self) -> ArchiveErrorCode {
        match self {
            Self::Config(_) => ArchiveErrorCode::E001Config,
            Self::MissingKey { .. } => ArchiveErrorCode::E002MissingKey,
            Self::Remote(_) => ArchiveErrorCode::E003Remote,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveErrorCode {
    E001Config,
    E002MissingKey,
    E003Remote,
}

impl ArchiveErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Config => "E001_CONFIG",
            Self::E002MissingKey => "E002_MISSING_KEY",
            Self::E003Remote => "E003_REMOTE",
        }
    }
}
