use thiserror::Error;

use crate::identity::CollisionReport;
use crate::merkle::MerkleError;

/// Run-level fatal errors. Everything here aborts the snapshot build before
/// any outward-facing artifact is published; dataset- and feature-level
/// problems are data (rejections in provenance), not errors.
#[derive(Debug, Error)]
pub enum RunError {
    /// Validation-stage fatality, e.g. a district id collision.
    #[error("validation fatal: {0}")]
    Validation(String),

    /// Normalization or packaging fatality.
    #[error("normalization fatal: {0}")]
    Normalization(String),

    /// The Merkle builder's self-check failed; an implementation bug, never
    /// masked.
    #[error(transparent)]
    Merkle(#[from] MerkleError),

    /// A region missed quorum during replication.
    #[error("replication failed beyond quorum: {0}")]
    Replication(String),

    /// A rollout failed verification and the rollback completed.
    #[error("rolled back: {0}")]
    RolledBack(String),

    /// The rollout was cancelled mid-flight.
    #[error("aborted: {0}")]
    Aborted(String),
}

impl From<CollisionReport> for RunError {
    fn from(report: CollisionReport) -> Self {
        RunError::Validation(report.to_string())
    }
}

impl RunError {
    /// Process exit code contract: 0 success, 1 validation fatal, 2
    /// normalization fatal, 3 merkle verification fatal, 4 replication
    /// failed beyond quorum, 5 rollback completed, 6 aborted.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Validation(_) => 1,
            RunError::Normalization(_) => 2,
            RunError::Merkle(_) => 3,
            RunError::Replication(_) => 4,
            RunError::RolledBack(_) => 5,
            RunError::Aborted(_) => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(RunError::Validation("x".into()).exit_code(), 1);
        assert_eq!(RunError::Normalization("x".into()).exit_code(), 2);
        assert_eq!(RunError::Merkle(MerkleError::Empty).exit_code(), 3);
        assert_eq!(RunError::Replication("x".into()).exit_code(), 4);
        assert_eq!(RunError::RolledBack("x".into()).exit_code(), 5);
        assert_eq!(RunError::Aborted("x".into()).exit_code(), 6);
    }
}
