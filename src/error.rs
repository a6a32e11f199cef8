//! Error types for the B-tree engine and its node stores

use crate::index::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BTreeError>;

#[derive(Error, Debug)]
pub enum BTreeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Tree corruption: {0}")]
    Corruption(String),
}

/// Failures raised by a [`NodeStore`](crate::storage::NodeStore).
///
/// These surface to the caller unchanged; the engine never retries.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Missing node record: {0}")]
    MissingRecord(NodeId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Data corruption: {0}")]
    Corruption(String),

    #[error("Injected fault: {0}")]
    Injected(String),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for BTreeError {
    fn from(err: std::io::Error) -> Self {
        BTreeError::Store(StoreError::Io(err))
    }
}

impl BTreeError {
    /// True for a delete miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BTreeError::NotFound(_))
    }
}
