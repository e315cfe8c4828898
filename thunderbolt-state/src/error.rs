use thiserror::Error;

use thunderbolt_chain::SerializationError;

/// An error from the persistent stores.
///
/// Any of these is fatal to the operation that hit it: the caller must
/// abandon the mutation it was attempting and leave the tip unchanged.
#[derive(Error, Debug)]
pub enum StorageError {
    /// An error from the segmented log files.
    #[error("log file i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the metadata index.
    #[error("database failure: {0}")]
    Database(#[from] sled::Error),

    /// A multi-tree write could not be applied atomically.
    #[error("database transaction failed: {0}")]
    Transaction(String),

    /// Stored bytes did not parse back into the type that wrote them.
    #[error("stored data is corrupt: {0}")]
    Corruption(#[from] SerializationError),

    /// An invariant-bearing key was absent.
    #[error("missing expected key: {0}")]
    Missing(&'static str),
}
