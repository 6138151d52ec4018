//! Segmented adjacency storage for one vertex label
//!
//! Vertices are grouped into segments of `vertex_per_seg` consecutive
//! offsets. A segment is materialized lazily the first time an edge touches
//! it and owns, per (edge label, direction), an array of per-vertex chain
//! heads `(latest edge block, epoch table)`.
//!
//! ```text
//! seg_table[seg] -> index block [label * 2 + dir] -> heads[vertex % vps]
//!                                                      |-> edge block -> prev -> ...
//!                                                      `-> epoch table
//! ```
//!
//! Everything lives in one arena allocated through a `BlockManager` and is
//! addressed by offset, so a reader that attaches the blob by id walks the
//! same structure. Writers only append entries, link new blocks and push
//! epoch-table entries; readers only follow what an epoch table published.

mod block;
pub mod reader;
pub mod writer;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::constants::WORD_BYTES;
use crate::core::arena::{BlobStore, SharedArena};
use crate::core::block_manager::{BlockManager, BlockStats};
use crate::error::{GraphError, Result};
use crate::types::{ArenaOffset, BlobId, Direction, Epoch, LabelId};

pub use reader::{EdgeEntry, EdgeIter, EpochGraphReader};
pub use writer::EpochGraphWriter;

/// Bytes of one per-vertex chain head: `(edge block, epoch table)`
const HEAD_BYTES: u64 = 2 * WORD_BYTES;

/// Published layout of a segment graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegGraphMeta {
  pub blob: BlobId,
  pub seg_table: ArenaOffset,
  pub num_segments: u64,
  pub vertex_per_seg: u64,
  pub edge_label_num: u64,
  /// Edge property bytes per edge label
  pub prop_bytes: Vec<u64>,
  /// Vertex slots claimed so far
  pub vertex_count: u64,
}

/// Read-only access to a segment graph arena
#[derive(Debug, Clone)]
pub struct SegGraphView {
  arena: Arc<SharedArena>,
  meta: SegGraphMeta,
}

impl SegGraphView {
  pub fn attach(store: &dyn BlobStore, meta: SegGraphMeta) -> Result<Self> {
    let arena = store.attach(meta.blob).ok_or(GraphError::BlobNotFound(meta.blob))?;
    Ok(Self { arena, meta })
  }

  pub fn meta(&self) -> &SegGraphMeta {
    &self.meta
  }

  pub(crate) fn arena(&self) -> &SharedArena {
    &self.arena
  }

  #[inline]
  fn index_slot(&self, label: LabelId, dir: Direction) -> u64 {
    debug_assert!((label as u64) < self.meta.edge_label_num);
    (label as u64 * 2 + dir.index() as u64) * WORD_BYTES
  }

  /// Address of the chain head for `(offset, label, dir)`, `None` when the
  /// segment or its label block was never created
  pub(crate) fn chain_head(
    &self,
    offset: u64,
    label: LabelId,
    dir: Direction,
  ) -> Option<ArenaOffset> {
    if label as u64 >= self.meta.edge_label_num {
      return None;
    }
    let seg = offset / self.meta.vertex_per_seg;
    if seg >= self.meta.num_segments {
      return None;
    }
    let index = self.arena.load(self.meta.seg_table + seg * WORD_BYTES);
    if index == 0 {
      return None;
    }
    let heads = self.arena.load(index + self.index_slot(label, dir));
    if heads == 0 {
      return None;
    }
    Some(heads + (offset % self.meta.vertex_per_seg) * HEAD_BYTES)
  }

  /// Whether the segment holding `offset` has a block for `(label, dir)`
  pub fn has_segment(&self, offset: u64, label: LabelId, dir: Direction) -> bool {
    self.chain_head(offset, label, dir).is_some()
  }

  /// Bind a reader to `epoch`
  pub fn reader(&self, epoch: Epoch) -> EpochGraphReader<'_> {
    EpochGraphReader::new(self, epoch)
  }

  /// Epochs checkpointed for one chain, oldest first
  pub fn checkpoint_epochs(&self, offset: u64, label: LabelId, dir: Direction) -> Vec<Epoch> {
    let Some(head) = self.chain_head(offset, label, dir) else {
      return Vec::new();
    };
    let table = self.arena.load(head + WORD_BYTES);
    if table == 0 {
      return Vec::new();
    }
    let table = block::EpochTable::at(&self.arena, table);
    (0..table.len()).map(|i| table.entry(i).0).collect()
  }
}

/// Counters kept by the writer
#[derive(Debug, Default)]
struct Counters {
  segments: AtomicU64,
  blocks: AtomicU64,
  compactions: AtomicU64,
  recycled: AtomicU64,
}

/// Snapshot of writer counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegGraphStats {
  pub segments: u64,
  pub blocks: u64,
  pub compactions: u64,
  pub recycled: u64,
  pub retired_pending: usize,
  pub allocator: BlockStats,
}

/// Block superseded at `epoch`, freed once readers can no longer reach it
#[derive(Debug, Clone, Copy)]
struct RetiredBlock {
  epoch: Epoch,
  offset: ArenaOffset,
  order: u32,
}

/// Writer-side segment graph
#[derive(Debug)]
pub struct SegGraph {
  name: &'static str,
  config: Arc<StoreConfig>,
  blocks: BlockManager,
  view: SegGraphView,
  seg_locks: Box<[Mutex<()>]>,
  vertex_count: AtomicU64,
  retired: Mutex<Vec<RetiredBlock>>,
  counters: Counters,
}

impl SegGraph {
  /// Create an empty graph with `prop_bytes[l]` property bytes per edge of label `l`
  pub fn new(
    store: &dyn BlobStore,
    name: &'static str,
    config: Arc<StoreConfig>,
    prop_bytes: Vec<u64>,
  ) -> Result<Self> {
    let blocks = BlockManager::new(
      store,
      name,
      config.edge_arena_capacity,
      config.large_block_order,
    )?;
    let num_segments = config.num_segments();
    let seg_table = blocks.alloc(BlockManager::order_for(num_segments * WORD_BYTES))?;
    blocks.arena().zero_words(seg_table, num_segments);

    let meta = SegGraphMeta {
      blob: blocks.blob(),
      seg_table,
      num_segments,
      vertex_per_seg: config.vertex_per_seg,
      edge_label_num: prop_bytes.len() as u64,
      prop_bytes,
      vertex_count: 0,
    };
    let view = SegGraphView {
      arena: Arc::clone(blocks.arena()),
      meta,
    };
    let seg_locks = (0..num_segments).map(|_| Mutex::new(())).collect();
    Ok(Self {
      name,
      config,
      blocks,
      view,
      seg_locks,
      vertex_count: AtomicU64::new(0),
      retired: Mutex::new(Vec::new()),
      counters: Counters::default(),
    })
  }

  pub fn view(&self) -> &SegGraphView {
    &self.view
  }

  /// Layout to publish for the current state
  pub fn meta(&self) -> SegGraphMeta {
    SegGraphMeta {
      vertex_count: self.vertex_count.load(Ordering::Acquire),
      ..self.view.meta.clone()
    }
  }

  pub fn vertex_count(&self) -> u64 {
    self.vertex_count.load(Ordering::Acquire)
  }

  pub fn edge_label_num(&self) -> usize {
    self.view.meta.edge_label_num as usize
  }

  /// Bind a writer to `epoch`
  pub fn create_graph_writer(&self, epoch: Epoch) -> EpochGraphWriter<'_> {
    EpochGraphWriter::new(self, epoch)
  }

  /// Bind a reader to `epoch`
  pub fn create_graph_reader(&self, epoch: Epoch) -> EpochGraphReader<'_> {
    self.view.reader(epoch)
  }

  pub fn stats(&self) -> SegGraphStats {
    SegGraphStats {
      segments: self.counters.segments.load(Ordering::Relaxed),
      blocks: self.counters.blocks.load(Ordering::Relaxed),
      compactions: self.counters.compactions.load(Ordering::Relaxed),
      recycled: self.counters.recycled.load(Ordering::Relaxed),
      retired_pending: self.retired.lock().len(),
      allocator: self.blocks.stats(),
    }
  }

  fn retire(&self, epoch: Epoch, offset: ArenaOffset, order: u32) {
    self.retired.lock().push(RetiredBlock {
      epoch,
      offset,
      order,
    });
  }

  /// Return blocks retired at least `LAG_EPOCH_NUMBER` epochs before
  /// `frontier` to the allocator. No reader may use an epoch below `frontier`.
  pub fn recycle_blocks(&self, frontier: Epoch) -> usize {
    let lag = crate::constants::LAG_EPOCH_NUMBER;
    let ready: Vec<RetiredBlock> = {
      let mut retired = self.retired.lock();
      let (ready, pending): (Vec<_>, Vec<_>) = retired
        .drain(..)
        .partition(|block| block.epoch + lag <= frontier);
      *retired = pending;
      ready
    };
    for block in &ready {
      self.blocks.free(block.offset, block.order);
    }
    self
      .counters
      .recycled
      .fetch_add(ready.len() as u64, Ordering::Relaxed);
    ready.len()
  }
}

#[cfg(test)]
mod tests;
