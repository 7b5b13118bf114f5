//! Engine failure taxonomy.
//!
//! Recoverable failures (store contention, store unavailability) are
//! retried by the engine loop with a fresh snapshot; everything else is
//! unrecoverable for the message and parks it on the dead-letter queue.

use crate::codec::CodecError;

/// SQLSTATE codes the store raises when concurrent committers collide.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The payload could not be decoded or failed validation.
    #[error(transparent)]
    Malformed(#[from] CodecError),

    /// The order references a company, user, or asset row that does not
    /// exist. Not retryable.
    #[error("referential failure: {0}")]
    Referential(String),

    /// Serialization failure or deadlock between committer transactions.
    #[error("store contention: {0}")]
    Contention(sqlx::Error),

    /// The store cannot be reached; the message must not be acked.
    #[error("store unavailable: {0}")]
    Unavailable(sqlx::Error),

    /// Any other store-side failure.
    #[error("store error: {0}")]
    Store(sqlx::Error),

    /// A bug surfaced mid-cycle (non-positive fill, missing row that was
    /// locked). The cycle is aborted and the message dead-lettered.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl EngineError {
    /// Whether the engine loop should retry the heartbeat in-process.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Contention(_) | EngineError::Unavailable(_))
    }

    /// Whether the message should go back on the queue once the retry
    /// budget is spent, instead of the dead-letter queue.
    pub fn requeue_on_exhaustion(&self) -> bool {
        matches!(self, EngineError::Unavailable(_))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                    EngineError::Contention(err)
                }
                _ => EngineError::Store(err),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => EngineError::Unavailable(err),
            _ => EngineError::Store(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_retryable_and_requeues() {
        let err = EngineError::from(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        )));
        assert!(matches!(err, EngineError::Unavailable(_)));
        assert!(err.is_retryable());
        assert!(err.requeue_on_exhaustion());
    }

    #[test]
    fn test_unrecoverable_classes() {
        let referential = EngineError::Referential("no such company".to_string());
        assert!(!referential.is_retryable());
        assert!(!referential.requeue_on_exhaustion());

        let invariant = EngineError::Invariant("negative fill".to_string());
        assert!(!invariant.is_retryable());
    }

    #[test]
    fn test_row_not_found_is_not_retryable() {
        let err = EngineError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, EngineError::Store(_)));
        assert!(!err.is_retryable());
    }
}
