#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("batch size must be at least 1 (got {0})")]
    InvalidBatchSize(usize),

    #[error("unknown membership strategy: {0} (expected `per-image` or `snapshot`)")]
    UnknownStrategy(String),

    #[error("invalid config value for {key}: {value}")]
    InvalidConfig { key: String, value: String },

    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("album not found: {0}")]
    AlbumNotFound(i64),

    #[error("store schema version {db} is newer than this build supports ({code}) — upgrade orphansweep")]
    SchemaTooNew { db: u32, code: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
