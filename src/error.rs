use thiserror::Error;

/// Infrastructure failures from the entity database or the line store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity source unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("write failed for line {key}: {reason}")]
    WriteFailed { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
