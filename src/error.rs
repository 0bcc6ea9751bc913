use thiserror::Error;
use uuid::Uuid;

/// Failure taxonomy for the scoring engine. Scoring itself never fails
/// beyond these: unexpected missing fields degrade to neutral contributions
/// inside the extractor instead of erroring.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The student has no attendance records in the evaluation window.
    /// Attendance is the mandatory minimum signal; nothing is persisted.
    #[error("no attendance records for student {0} in the evaluation window")]
    InsufficientData(Uuid),

    /// The requested algorithm policy version is not registered.
    #[error("unknown algorithm policy version {0:?}")]
    UnknownPolicyVersion(String),

    /// A collaborator store read or write failed.
    #[error("record store unavailable: {0}")]
    StoreUnavailable(anyhow::Error),
}

impl EngineError {
    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        EngineError::StoreUnavailable(err.into())
    }
}
