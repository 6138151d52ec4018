//! Epoch-bound adjacency writes
//!
//! A full edge block is replaced, never rewritten. If at least
//! `compaction_ratio` of the chain is reclaimable (tombstones plus the entries
//! they cancel) the replacement starts a new chain holding only live entries.
//! Otherwise it extends the chain with a block one order larger, until the
//! large-block order is reached, after which chain growth is linear.

use std::sync::atomic::Ordering;

use tracing::debug;

use crate::constants::{TOMBSTONE_BIT, WORD_BYTES};
use crate::core::block_manager::BlockManager;
use crate::error::{GraphError, Result};
use crate::seggraph::block::{
  edge_capacity, epoch_table_capacity, EdgeBlock, EpochTable, EPOCH_TABLE_MIN_ORDER,
};
use crate::seggraph::reader::EdgeIter;
use crate::seggraph::{SegGraph, HEAD_BYTES};
use crate::types::{ArenaOffset, Direction, Epoch, LabelId};

/// Write view of a segment graph bound to one epoch
#[derive(Clone, Copy)]
pub struct EpochGraphWriter<'a> {
  graph: &'a SegGraph,
  epoch: Epoch,
}

impl<'a> EpochGraphWriter<'a> {
  pub(crate) fn new(graph: &'a SegGraph, epoch: Epoch) -> Self {
    Self { graph, epoch }
  }

  pub fn epoch(&self) -> Epoch {
    self.epoch
  }

  /// Claim the next vertex slot
  pub fn new_vertex(&self) -> Result<u64> {
    let max = self.graph.config.max_vertices_per_label;
    let offset = self.graph.vertex_count.fetch_add(1, Ordering::AcqRel);
    if offset >= max {
      self.graph.vertex_count.fetch_sub(1, Ordering::AcqRel);
      return Err(GraphError::OutOfCapacity {
        what: "segment graph vertices",
        requested: offset + 1,
        capacity: max,
      });
    }
    Ok(offset)
  }

  /// Make sure slots up to `offset` are claimed
  pub fn ensure_vertex(&self, offset: u64) -> Result<()> {
    let max = self.graph.config.max_vertices_per_label;
    if offset >= max {
      return Err(GraphError::OutOfCapacity {
        what: "segment graph vertices",
        requested: offset + 1,
        capacity: max,
      });
    }
    self.graph.vertex_count.fetch_max(offset + 1, Ordering::AcqRel);
    Ok(())
  }

  /// Chain head for `(offset, label, dir)`, creating the segment's label
  /// block on first use
  pub fn locate_segment(&self, offset: u64, label: LabelId, dir: Direction) -> Result<ArenaOffset> {
    let graph = self.graph;
    if let Some(head) = graph.view.chain_head(offset, label, dir) {
      return Ok(head);
    }
    let meta = &graph.view.meta;
    assert!((label as u64) < meta.edge_label_num, "edge label {label} out of range");
    let seg = offset / meta.vertex_per_seg;
    if seg >= meta.num_segments {
      return Err(GraphError::OutOfCapacity {
        what: "segment graph vertices",
        requested: offset + 1,
        capacity: graph.config.max_vertices_per_label,
      });
    }

    let arena = graph.blocks.arena();
    let _guard = graph.seg_locks[seg as usize].lock();
    let seg_slot = meta.seg_table + seg * WORD_BYTES;
    let mut index = arena.load(seg_slot);
    if index == 0 {
      let words = meta.edge_label_num * 2;
      index = graph.blocks.alloc(BlockManager::order_for(words * WORD_BYTES))?;
      arena.zero_words(index, words);
      arena.store(seg_slot, index);
      graph.counters.segments.fetch_add(1, Ordering::Relaxed);
    }
    let index_slot = index + graph.view.index_slot(label, dir);
    let mut heads = arena.load(index_slot);
    if heads == 0 {
      let bytes = meta.vertex_per_seg * HEAD_BYTES;
      heads = graph.blocks.alloc(BlockManager::order_for(bytes))?;
      arena.zero_words(heads, bytes / WORD_BYTES);
      arena.store(index_slot, heads);
    }
    Ok(heads + (offset % meta.vertex_per_seg) * HEAD_BYTES)
  }

  /// Append an edge (or, with `TOMBSTONE_BIT` set, a cancellation) to the
  /// list of vertex `offset`
  pub fn put_edge(
    &self,
    offset: u64,
    label: LabelId,
    dir: Direction,
    value: u64,
    props: &[u8],
  ) -> Result<()> {
    let graph = self.graph;
    let arena = graph.blocks.arena();
    let head = self.locate_segment(offset, label, dir)?;
    let prop_words = graph.view.meta.prop_bytes[label as usize].div_ceil(WORD_BYTES);

    let current = arena.load(head);
    let block = if current == 0 {
      self.new_block(self.first_order(prop_words), prop_words, 0, 0, 0)?
    } else {
      let block = EdgeBlock::at(arena, current);
      if block.num_entries() < block.capacity() {
        block
      } else {
        self.replace_full_block(block)?
      }
    };

    block.push(value, props, value & TOMBSTONE_BIT != 0);
    if block.offset() != current {
      arena.store(head, block.offset());
    }
    self.record_epoch(head, block.offset(), block.chain_entries())
  }

  /// Cancel the newest live edge to `neighbor`. Returns false when there is none.
  pub fn delete_edge(
    &self,
    offset: u64,
    label: LabelId,
    dir: Direction,
    neighbor: u64,
  ) -> Result<bool> {
    let rank = self
      .edges(offset, label, dir)
      .find(|entry| entry.neighbor() == neighbor)
      .map(|entry| entry.rank());
    match rank {
      Some(rank) => {
        self.put_edge(offset, label, dir, TOMBSTONE_BIT | rank, &[])?;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  /// Every entry appended so far, including the epoch being written
  pub fn edges(&self, offset: u64, label: LabelId, dir: Direction) -> EdgeIter<'a> {
    let arena = self.graph.blocks.arena().as_ref();
    match self.graph.view.chain_head(offset, label, dir) {
      Some(head) => {
        let block = arena.load(head);
        if block == 0 {
          return EdgeIter::empty(arena);
        }
        EdgeIter::new(arena, block, EdgeBlock::at(arena, block).chain_entries())
      }
      None => EdgeIter::empty(arena),
    }
  }

  fn first_order(&self, prop_words: u64) -> u32 {
    let mut order = self.graph.config.min_edge_block_order;
    while edge_capacity(order, prop_words) == 0 {
      order += 1;
    }
    order
  }

  fn new_block(
    &self,
    order: u32,
    prop_words: u64,
    prev: ArenaOffset,
    prev_num_entries: u64,
    tombstones: u64,
  ) -> Result<EdgeBlock<'a>> {
    let graph = self.graph;
    let at = graph.blocks.alloc(order)?;
    graph.counters.blocks.fetch_add(1, Ordering::Relaxed);
    Ok(EdgeBlock::init(
      graph.blocks.arena(),
      at,
      order,
      prop_words,
      prev,
      prev_num_entries,
      tombstones,
      self.epoch,
    ))
  }

  fn replace_full_block(&self, full: EdgeBlock<'a>) -> Result<EdgeBlock<'a>> {
    let total = full.chain_entries();
    let reclaimable = 2 * full.tombstones();
    if total > 0 && reclaimable as f64 / total as f64 >= self.graph.config.compaction_ratio {
      return self.compact(full);
    }
    let order = if full.order() < self.graph.config.large_block_order {
      full.order() + 1
    } else {
      full.order()
    };
    self.new_block(order, full.prop_words(), full.offset(), total, full.tombstones())
  }

  /// Start a fresh chain holding only the live entries of `full`'s chain
  fn compact(&self, full: EdgeBlock<'a>) -> Result<EdgeBlock<'a>> {
    let graph = self.graph;
    let arena = graph.blocks.arena().as_ref();
    let prop_words = full.prop_words();

    let mut live: Vec<(ArenaOffset, u64)> =
      EdgeIter::new(arena, full.offset(), full.chain_entries())
        .map(|entry| (entry.block_offset(), entry.local_index()))
        .collect();
    live.reverse();

    let mut order = self
      .first_order(prop_words)
      .max(full.order().min(graph.config.large_block_order));
    while edge_capacity(order, prop_words) < live.len() as u64 + 1 {
      order += 1;
    }
    let fresh = self.new_block(order, prop_words, 0, 0, 0)?;
    for &(block, local) in &live {
      EdgeBlock::at(arena, block).copy_entry_to(local, &fresh);
    }

    let mut retired = 0usize;
    let mut cursor = full.offset();
    while cursor != 0 {
      let block = EdgeBlock::at(arena, cursor);
      let prev = block.prev();
      graph.retire(self.epoch, cursor, block.order());
      retired += 1;
      cursor = prev;
    }
    graph.counters.compactions.fetch_add(1, Ordering::Relaxed);
    debug!(
      graph = graph.name,
      epoch = self.epoch,
      live = live.len(),
      dropped = full.chain_entries() - live.len() as u64,
      retired,
      "edge chain compacted"
    );
    Ok(fresh)
  }

  fn record_epoch(&self, head: ArenaOffset, block: ArenaOffset, num_entries: u64) -> Result<()> {
    let graph = self.graph;
    let arena = graph.blocks.arena().as_ref();
    let table_slot = head + WORD_BYTES;
    let current = arena.load(table_slot);
    if current == 0 {
      let at = graph.blocks.alloc(EPOCH_TABLE_MIN_ORDER)?;
      let table = EpochTable::init(arena, at, EPOCH_TABLE_MIN_ORDER);
      table.push(self.epoch, block, num_entries);
      arena.store(table_slot, at);
      return Ok(());
    }

    let table = EpochTable::at(arena, current);
    let len = table.len();
    if len > 0 && table.entry(len - 1).0 == self.epoch {
      table.update_last(block, num_entries);
      return Ok(());
    }
    if len < table.capacity() {
      table.push(self.epoch, block, num_entries);
      return Ok(());
    }

    let order = table.order() + 1;
    let at = graph.blocks.alloc(order)?;
    let grown = EpochTable::init(arena, at, order);
    debug_assert!(epoch_table_capacity(order) > len);
    table.copy_to(&grown);
    grown.push(self.epoch, block, num_entries);
    arena.store(table_slot, at);
    graph.retire(self.epoch, current, table.order());
    debug!(graph = graph.name, epoch = self.epoch, entries = len + 1, "epoch table grown");
    Ok(())
  }
}
