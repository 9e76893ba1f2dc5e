use thiserror::Error;

/// Errors returned by faceid operations.
#[derive(Debug, Error)]
pub enum FaceIdError {
    #[error("faceid: malformed vector: {0}")]
    MalformedVector(String),

    #[error("faceid: unknown identity {0}")]
    UnknownIdentity(u64),

    #[error("faceid: duplicate identity {0}")]
    DuplicateIdentity(u64),

    #[error("faceid: invalid threshold {0}")]
    InvalidThreshold(f64),

    #[error("faceid: invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("faceid: store error: {0}")]
    Store(String),
}

impl From<serde_json::Error> for FaceIdError {
    fn from(e: serde_json::Error) -> Self {
        FaceIdError::Store(format!("serialization: {e}"))
    }
}

/// Maps any storage backend error into [`FaceIdError::Store`].
pub(crate) fn store_err<E: std::fmt::Display>(e: E) -> FaceIdError {
    FaceIdError::Store(e.to_string())
}
