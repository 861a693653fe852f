use std::io;

/// Structured error taxonomy for the content store. Callers branch on the
/// variant, never on a string message.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("content {0:02x?} not found")]
    NotFound(crate::ContentId),
    #[error("store is closed")]
    Closed,
    #[error("store i/o failure: {0}")]
    Io(#[source] io::Error),
    #[error("store backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        StoreError::Backend(msg.into())
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(io_err) => StoreError::Io(io_err),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl<E: std::fmt::Display> From<sled::transaction::TransactionError<E>> for StoreError {
    fn from(err: sled::transaction::TransactionError<E>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(inner) => {
                StoreError::Backend(inner.to_string())
            }
            sled::transaction::TransactionError::Storage(sled_err) => sled_err.into(),
        }
    }
}
