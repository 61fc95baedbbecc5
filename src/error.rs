//! Error taxonomy for archive ingestion and stats queries.

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendError;
use crate::ingest::{Phase, SinkError};

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive file is missing, unreadable, or does not match the export shape.
    #[error("malformed archive {}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    /// A required credential was not provided by flag, environment, or env file.
    #[error("{0} is not set")]
    ConfigMissing(&'static str),

    #[error("failed to upload archive to storage: {0}")]
    UploadFailed(#[source] BackendError),

    /// A write or a progress event failed. Rows committed by earlier phases stay committed.
    #[error("processing failed during {phase}: {cause}")]
    ProcessingFailed {
        phase: Phase,
        #[source]
        cause: ProcessingCause,
    },

    #[error("expected exactly one aggregate row, got {rows}")]
    AggregateNotFound { rows: usize },

    #[error("aggregate column `{column}` is missing or not a number")]
    SchemaMismatch { column: &'static str },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum ProcessingCause {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("failed to encode row: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ArchiveError {
    pub fn processing(phase: Phase, cause: impl Into<ProcessingCause>) -> Self {
        Self::ProcessingFailed {
            phase,
            cause: cause.into(),
        }
    }

    /// Phase the ingest run was in when it failed, if any.
    pub fn failed_phase(&self) -> Option<Phase> {
        match self {
            Self::UploadFailed(_) => Some(Phase::UploadingStorage),
            Self::ProcessingFailed { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_failed_names_the_phase() {
        let err = ArchiveError::processing(Phase::InsertingTweets, SinkError::Closed);
        assert_eq!(err.failed_phase(), Some(Phase::InsertingTweets));
        assert!(err.to_string().contains("InsertingTweets"));
    }

    #[test]
    fn config_missing_names_the_variable() {
        let err = ArchiveError::ConfigMissing("CARCHIVE_SERVICE_KEY");
        assert_eq!(err.to_string(), "CARCHIVE_SERVICE_KEY is not set");
        assert_eq!(err.failed_phase(), None);
    }
}
