#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("revision conflict on {id}: expected {expected:?}, stored {actual:?}")]
    Conflict {
        id: String,
        expected: Option<String>,
        actual: Option<String>,
    },
}

impl DbError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
