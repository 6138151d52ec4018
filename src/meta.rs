//! Published epoch metadata and the key-value store it is published to
//!
//! At each finalized epoch the store writes one JSON document naming every
//! blob a reader must attach, plus the frontiers that bound what the reader
//! may see. Readers never look at writer state, only at this document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::constants::{
  BLOB_KEY_PREFIX, LATEST_EPOCH_KEY_PREFIX, NO_EPOCH_PUBLISHED, SCHEMA_KEY_PREFIX,
};
use crate::core::hashmap::MapMeta;
use crate::core::vertex_table::VertexTableMeta;
use crate::error::{GraphError, Result};
use crate::property::FamilyMeta;
use crate::seggraph::SegGraphMeta;
use crate::types::{BlobId, Epoch};

// ============================================================================
// Metadata documents
// ============================================================================

/// Handle of a fixed-length word array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayMeta {
  pub blob: BlobId,
  pub len: u64,
}

/// Blobs of one vertex label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelBlobs {
  pub vertex_table: VertexTableMeta,
  /// Adjacency of inner vertices, indexed by offset
  pub inner_edges: SegGraphMeta,
  /// Adjacency of mirror vertices, indexed by mirror index
  pub outer_edges: SegGraphMeta,
  /// Mirror index to global id
  pub ovl2g: ArrayMeta,
  /// Global id to mirror index
  pub ovg2l: MapMeta,
  /// External id to global id
  pub vertex_map: MapMeta,
  /// Inner offset to external id, versioned since offsets are reused
  pub inner_oids: MapMeta,
  /// External id per mirror index
  pub outer_oids: ArrayMeta,
  pub properties: Vec<FamilyMeta>,
  pub inner_vertex_num: u64,
  pub outer_vertex_num: u64,
}

/// Everything a reader needs to open one partition at one epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochMetadata {
  pub ipc_socket: String,
  pub machine_id: u64,
  pub fid: u64,
  pub fnum: u64,
  pub epoch: Epoch,
  pub vertex_label_num: usize,
  pub edge_label_num: usize,
  pub string_buffer: BlobId,
  pub labels: Vec<LabelBlobs>,
  pub total_vertex_num: u64,
  pub total_edge_num: u64,
}

impl EpochMetadata {
  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string(self)?)
  }

  pub fn from_json_str(json: &str) -> Result<Self> {
    Ok(serde_json::from_str(json)?)
  }
}

// ============================================================================
// Keys
// ============================================================================

/// `<prefix>gart_blob_m<machine>_p<fid>_e<epoch>`
pub fn blob_key(prefix: &str, machine_id: u64, fid: u64, epoch: Epoch) -> String {
  format!("{prefix}{BLOB_KEY_PREFIX}{machine_id}_p{fid}_e{epoch}")
}

/// `<prefix>gart_latest_epoch_p<fid>`
pub fn latest_epoch_key(prefix: &str, fid: u64) -> String {
  format!("{prefix}{LATEST_EPOCH_KEY_PREFIX}{fid}")
}

/// `<prefix>gart_schema_p<fid>`
pub fn schema_key(prefix: &str, fid: u64) -> String {
  format!("{prefix}{SCHEMA_KEY_PREFIX}{fid}")
}

/// Latest finalized epoch of partition `fid`, `None` before the first one
pub fn latest_epoch(store: &dyn MetaStore, prefix: &str, fid: u64) -> Result<Option<Epoch>> {
  let key = latest_epoch_key(prefix, fid);
  let value = store
    .get(&key)?
    .ok_or_else(|| GraphError::MetadataNotFound(key.clone()))?;
  let epoch: Epoch = value
    .trim()
    .parse()
    .map_err(|_| GraphError::MetadataNotFound(format!("{key} holds {value:?}")))?;
  Ok((epoch != NO_EPOCH_PUBLISHED).then_some(epoch))
}

// ============================================================================
// Metadata stores
// ============================================================================

/// Key-value store metadata documents are published to
pub trait MetaStore: Send + Sync {
  fn put(&self, key: &str, value: &str) -> Result<()>;
  fn get(&self, key: &str) -> Result<Option<String>>;
}

/// In-process metadata store
#[derive(Debug, Default)]
pub struct MemoryMetaStore {
  entries: RwLock<HashMap<String, String>>,
}

impl MemoryMetaStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.read().is_empty()
  }
}

impl MetaStore for MemoryMetaStore {
  fn put(&self, key: &str, value: &str) -> Result<()> {
    self.entries.write().insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn get(&self, key: &str) -> Result<Option<String>> {
    Ok(self.entries.read().get(key).cloned())
  }
}

/// One file per key under a directory. Writes go through a temporary file
/// and a rename so readers never see a partial document.
#[derive(Debug)]
pub struct DirMetaStore {
  dir: PathBuf,
}

impl DirMetaStore {
  pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
    let dir = dir.as_ref().to_path_buf();
    fs::create_dir_all(&dir)?;
    Ok(Self { dir })
  }

  fn path(&self, key: &str) -> PathBuf {
    let name: String = key
      .chars()
      .map(|c| if c == '/' || c == '\\' { '_' } else { c })
      .collect();
    self.dir.join(name)
  }
}

impl MetaStore for DirMetaStore {
  fn put(&self, key: &str, value: &str) -> Result<()> {
    let path = self.path(key);
    let tmp = path.with_extension("tmp");
    {
      let mut file = fs::File::create(&tmp)?;
      file.write_all(value.as_bytes())?;
      file.sync_all()?;
    }
    fs::rename(&tmp, &path)?;
    trace!(key, bytes = value.len(), "metadata written");
    Ok(())
  }

  fn get(&self, key: &str) -> Result<Option<String>> {
    match fs::read_to_string(self.path(key)) {
      Ok(value) => Ok(Some(value)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }
}
