/// Error types for synchronization

use crate::remote::RemoteError;
use crate::workflow::SnapshotError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Talking to the remote failed before anything else was touched
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The local snapshot could not be written; nothing was broadcast
    #[error("failed to write local snapshot for workflow {workflow_id}: {source}")]
    LocalWriteFailed {
        workflow_id: String,
        #[source]
        source: SnapshotError,
    },

    /// The local snapshot exists but is not a valid workflow
    #[error("local snapshot for workflow {workflow_id} is malformed: {source}")]
    LocalParseError {
        workflow_id: String,
        #[source]
        source: SnapshotError,
    },

    #[error("failed to read local snapshot for workflow {workflow_id}: {source}")]
    LocalReadFailed {
        workflow_id: String,
        #[source]
        source: SnapshotError,
    },

    #[error("no local snapshot for workflow {0}")]
    SnapshotMissing(String),

    /// Local and session copies were updated but the remote replace failed.
    /// The local copy is now ahead of the remote until the next sync.
    #[error("workflow {workflow_id} was updated locally but the remote write failed: {source}")]
    RemoteWriteFailed {
        workflow_id: String,
        #[source]
        source: RemoteError,
    },
}

impl SyncError {
    /// Classify a failed snapshot read for `workflow_id`
    pub fn from_snapshot_read(workflow_id: &str, source: SnapshotError) -> Self {
        let workflow_id = workflow_id.to_string();
        match source {
            SnapshotError::Parse { .. } => SyncError::LocalParseError { workflow_id, source },
            err if err.is_not_found() => SyncError::SnapshotMissing(workflow_id),
            err => SyncError::LocalReadFailed {
                workflow_id,
                source: err,
            },
        }
    }

    /// Whether local and session state were left ahead of the remote
    pub fn is_divergence(&self) -> bool {
        matches!(self, SyncError::RemoteWriteFailed { .. })
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
