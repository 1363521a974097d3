//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use trainer_core::model::SessionStateError;

use crate::source::SourceError;

/// Errors emitted by `SessionFlowService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FlowError {
    /// Starting a suite with zero active questions; no session is created.
    #[error("no active questions for suite '{suite}'")]
    NoActiveQuestions { suite: String },

    #[error("session not found")]
    SessionNotFound,

    /// The operation requires an in-progress session.
    #[error("session is not in progress")]
    NotInProgress,

    /// A concurrent caller committed the same session first; the operation
    /// took no effect and can be retried against fresh state.
    #[error("session was updated concurrently")]
    Conflict,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<SessionStateError> for FlowError {
    fn from(_: SessionStateError) -> Self {
        Self::NotInProgress
    }
}

/// Errors emitted by `CatalogSyncService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
