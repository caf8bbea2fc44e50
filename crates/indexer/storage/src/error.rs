use thiserror::Error;

/// Errors that may occur while interacting with indexer storage.
///
/// This enum is shared by every implementation of the storage traits.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested entry does not exist.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// The storage handle was closed.
    #[error("storage is closed")]
    Closed,

    /// A stored value could not be converted back into a record.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The database reported an error.
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    /// Returns true if the error reports a missing entry.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
