//! # Errors
//!
//! Central error taxonomy for the engine.

use thiserror::Error;

use crate::schema::SchemaError;

/// Result type for engine operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Engine errors
#[derive(Debug, Error)]
pub enum Error {
    /// Primary entry absent: `get`, `del` or `index` of a record that is
    /// not stored
    #[error("not found")]
    NotFound,

    /// Record schema violation
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Record serialization or deserialization failure
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),

    /// Propagated from the key-value substrate
    #[error(transparent)]
    Substrate(#[from] SubstrateError),

    /// Filesystem-level failure outside the substrate
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Returned by a record hook after commit; the commit stands
    #[error("hook: {0}")]
    Hook(#[source] Box<Error>),

    /// Produced by a subscriber callback; removes that subscription only
    #[error("subscriber: {0}")]
    Subscriber(String),

    /// Write operation reached a read-only transaction
    #[error("write operation in a read-only transaction")]
    ReadOnly,

    /// Stored bucket or key structure violates the layout
    #[error("corrupt: {0}")]
    Corrupt(String),
}

impl Error {
    /// Create a subscriber error
    pub fn subscriber(msg: impl Into<String>) -> Self {
        Self::Subscriber(msg.into())
    }

    /// Returns true for the absent-record error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Substrate errors, propagated verbatim from the key-value store
#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error(transparent)]
    Open(#[from] redb::DatabaseError),

    #[error(transparent)]
    Transaction(#[from] redb::TransactionError),

    #[error(transparent)]
    Table(#[from] redb::TableError),

    #[error(transparent)]
    Storage(#[from] redb::StorageError),

    #[error(transparent)]
    Commit(#[from] redb::CommitError),
}

impl From<redb::DatabaseError> for Error {
    fn from(err: redb::DatabaseError) -> Self {
        Error::Substrate(err.into())
    }
}

impl From<redb::TransactionError> for Error {
    fn from(err: redb::TransactionError) -> Self {
        Error::Substrate(err.into())
    }
}

impl From<redb::TableError> for Error {
    fn from(err: redb::TableError) -> Self {
        Error::Substrate(err.into())
    }
}

impl From<redb::StorageError> for Error {
    fn from(err: redb::StorageError) -> Self {
        Error::Substrate(err.into())
    }
}

impl From<redb::CommitError> for Error {
    fn from(err: redb::CommitError) -> Self {
        Error::Substrate(err.into())
    }
}
