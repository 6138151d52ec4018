//! Error types for the graph store
//!
//! Configuration, schema and capacity failures are returned as `Err` so the
//! embedding process decides how to abort. Lookup misses never show up here;
//! they are `Option`/`bool` returns at the call site. `MalformedRecord` is the
//! only variant ingestion recovers from (log and skip).

use thiserror::Error;

use crate::types::{BlobId, LabelId};

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("invalid schema: {0}")]
  Schema(String),

  #[error("unknown data type: {0}")]
  UnknownDataType(String),

  #[error("{what} out of capacity: requested {requested} bytes, capacity {capacity} bytes")]
  OutOfCapacity {
    what: &'static str,
    requested: u64,
    capacity: u64,
  },

  #[error("vertex table for label {label} is full")]
  VertexTableFull { label: LabelId },

  #[error("malformed record: {0}")]
  MalformedRecord(String),

  #[error("blob {0} not found")]
  BlobNotFound(BlobId),

  #[error("metadata key {0} not found")]
  MetadataNotFound(String),

  #[error("runner stopped: {0}")]
  RunnerStopped(String),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

impl GraphError {
  /// Whether ingestion may log this error and continue with the next record
  pub fn is_recoverable(&self) -> bool {
    matches!(self, GraphError::MalformedRecord(_))
  }

  pub(crate) fn malformed(msg: impl Into<String>) -> Self {
    GraphError::MalformedRecord(msg.into())
  }
}
