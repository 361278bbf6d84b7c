use std::time::Duration;

use thiserror::Error;

use crate::replica_writer::RemoteError;

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Error taxonomy for the write coordinator.
///
/// Every variant corresponds to one kind of failure the coordinator itself
/// can surface; errors raised by collaborators that don't need individual
/// matching at this layer are laundered through [`CoordinatorError::Other`].
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("invalid consistency level: {0:?}")]
    InvalidConsistencyLevel(String),

    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("retention policy not found: {db}/{policy}")]
    RetentionPolicyNotFound { db: String, policy: String },

    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error("partial write: {acked} of {required} replicas acknowledged")]
    PartialWrite { acked: usize, required: usize },

    #[error("write failed: {reason}")]
    WriteFailed { reason: String },

    /// Sentinel returned by a [`LocalStore`](crate::replica_writer::LocalStore)
    /// implementation when the shard has never been created on this node.
    #[error("shard not found")]
    ShardNotFound,

    #[error("remote write failed: {0}")]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoordinatorError {
    pub(crate) fn write_failed(reason: impl Into<String>) -> Self {
        CoordinatorError::WriteFailed {
            reason: reason.into(),
        }
    }
}
