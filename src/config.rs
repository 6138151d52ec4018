//! Store configuration
//!
//! One `StoreConfig` is built at startup and shared as `Arc<StoreConfig>` with
//! every component that needs a tuning knob. All fields have defaults, so a
//! JSON override file only has to name what it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{GraphError, Result};

/// Wait policy used by queue producers and consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
  /// Exponential spin rounds before switching to `yield_now`
  pub spin_limit: u32,
  /// Rounds after which a waiter counts as idle
  pub yield_limit: u32,
  /// Park on a condition variable instead of spinning
  pub blocking: bool,
}

impl Default for BackoffConfig {
  fn default() -> Self {
    Self {
      spin_limit: DEFAULT_SPIN_LIMIT,
      yield_limit: DEFAULT_YIELD_LIMIT,
      blocking: false,
    }
  }
}

/// Configuration for one partition's store and the readers attached to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Vertices per adjacency segment (power of two)
  pub vertex_per_seg: u64,
  /// Vertex table slots per label (inner and outer share them)
  pub max_vertices_per_label: u64,
  /// Byte capacity of each segment graph arena
  pub edge_arena_capacity: u64,
  /// Granularity in which arenas commit memory
  pub arena_chunk_bytes: u64,
  /// Order of the first edge block in a chain
  pub min_edge_block_order: u32,
  /// Orders at or above this use the shared large-block free list and stop doubling
  pub large_block_order: u32,
  /// Reclaimable share of a chain that triggers compaction on block overflow
  pub compaction_ratio: f64,
  /// Rows per property page
  pub rows_per_page: u64,
  /// Byte capacity of each column family arena
  pub property_arena_capacity: u64,
  /// Byte capacity of the shared string buffer
  pub string_buffer_capacity: u64,
  /// Initial slot count of versioned hashmaps
  pub hashmap_initial_capacity: u64,
  /// Prefix prepended to every metadata key
  pub meta_prefix: String,
  /// Machine id used in blob metadata keys
  pub machine_id: u64,
  /// Shared-memory endpoint readers attach through
  pub ipc_socket: String,
  /// Bounded queue length between log producers and the apply thread
  pub queue_capacity: usize,
  pub backoff: BackoffConfig,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      vertex_per_seg: DEFAULT_VERTEX_PER_SEG,
      max_vertices_per_label: DEFAULT_MAX_VERTICES_PER_LABEL,
      edge_arena_capacity: DEFAULT_EDGE_ARENA_CAPACITY,
      arena_chunk_bytes: DEFAULT_ARENA_CHUNK_BYTES,
      min_edge_block_order: DEFAULT_MIN_EDGE_BLOCK_ORDER,
      large_block_order: DEFAULT_LARGE_BLOCK_ORDER,
      compaction_ratio: DEFAULT_COMPACTION_RATIO,
      rows_per_page: DEFAULT_ROWS_PER_PAGE,
      property_arena_capacity: DEFAULT_PROPERTY_ARENA_CAPACITY,
      string_buffer_capacity: DEFAULT_STRING_BUFFER_CAPACITY,
      hashmap_initial_capacity: DEFAULT_HASHMAP_CAPACITY,
      meta_prefix: String::new(),
      machine_id: 0,
      ipc_socket: String::new(),
      queue_capacity: DEFAULT_QUEUE_CAPACITY,
      backoff: BackoffConfig::default(),
    }
  }
}

impl StoreConfig {
  /// Parse a JSON override document and validate it
  pub fn from_json_str(json: &str) -> Result<Self> {
    let config: StoreConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  /// Load a JSON override file and validate it
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
    let text = std::fs::read_to_string(path)?;
    Self::from_json_str(&text)
  }

  /// Reject knob combinations the storage layout cannot honor
  pub fn validate(&self) -> Result<()> {
    if self.vertex_per_seg == 0 || !self.vertex_per_seg.is_power_of_two() {
      return Err(GraphError::Config(format!(
        "vertex_per_seg must be a power of two, got {}",
        self.vertex_per_seg
      )));
    }
    if self.max_vertices_per_label == 0 {
      return Err(GraphError::Config(
        "max_vertices_per_label must be positive".to_string(),
      ));
    }
    if !(self.compaction_ratio > 0.0 && self.compaction_ratio <= 1.0) {
      return Err(GraphError::Config(format!(
        "compaction_ratio must be in (0, 1], got {}",
        self.compaction_ratio
      )));
    }
    if self.rows_per_page == 0 {
      return Err(GraphError::Config(
        "rows_per_page must be positive".to_string(),
      ));
    }
    if self.min_edge_block_order < MIN_BLOCK_ORDER + 4
      || self.min_edge_block_order > self.large_block_order
      || self.large_block_order > MAX_BLOCK_ORDER
    {
      return Err(GraphError::Config(format!(
        "edge block orders out of range: min {} large {}",
        self.min_edge_block_order, self.large_block_order
      )));
    }
    if self.arena_chunk_bytes < WORD_BYTES || !self.arena_chunk_bytes.is_power_of_two() {
      return Err(GraphError::Config(format!(
        "arena_chunk_bytes must be a power of two of at least one word, got {}",
        self.arena_chunk_bytes
      )));
    }
    if self.hashmap_initial_capacity < 4 {
      return Err(GraphError::Config(
        "hashmap_initial_capacity must be at least 4".to_string(),
      ));
    }
    if self.queue_capacity == 0 {
      return Err(GraphError::Config(
        "queue_capacity must be positive".to_string(),
      ));
    }
    Ok(())
  }

  /// Number of segments a label's vertex range splits into
  pub fn num_segments(&self) -> u64 {
    self.max_vertices_per_label.div_ceil(self.vertex_per_seg)
  }
}
