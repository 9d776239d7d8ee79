use std::time::Duration;

use depot_types::Location;

/// Errors from storage backends and write streams.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A write would exceed the declared content length. The stream has been
    /// aborted.
    #[error("write overflow: {attempted} bytes exceed declared length of {limit}")]
    WriteOverflow { limit: u64, attempted: u64 },

    /// No file is stored for the location.
    #[error("file does not exist: {0}")]
    FileDoesNotExist(Location),

    /// The backend cannot store files for the location.
    #[error("unsupported location: {0:?}")]
    UnsupportedLocation(Location),

    /// The stream was already closed or aborted.
    #[error("write stream is closed")]
    StreamClosed,

    /// `close` was called on a stream that had been aborted.
    #[error("write stream was aborted")]
    StreamAborted,

    /// `abort` was called on a stream that had already been committed.
    #[error("write stream already committed, can no longer abort")]
    AbortAfterCommit,

    /// The background worker did not acknowledge an abort in time.
    #[error("abort not acknowledged within {0:?}")]
    AbortTimeout(Duration),

    /// The remote service reported a failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
