//! Epoch-bound adjacency reads
//!
//! A reader resolves a vertex's edge list for its epoch through the epoch
//! table: the newest checkpoint not after the read epoch names the block and
//! the chain-wide entry count that were current then. Iteration starts at that
//! count and walks ranks downward through `prev` links, so nothing appended
//! later is ever reached.

use std::collections::BinaryHeap;

use crate::constants::{PAYLOAD_MASK, TOMBSTONE_BIT, WORD_BYTES};
use crate::core::arena::SharedArena;
use crate::seggraph::block::{EdgeBlock, EpochTable};
use crate::seggraph::SegGraphView;
use crate::types::{ArenaOffset, Direction, Epoch, LabelId};

/// One live edge seen by an iterator
#[derive(Clone, Copy)]
pub struct EdgeEntry<'a> {
  arena: &'a SharedArena,
  block: ArenaOffset,
  local: u64,
  rank: u64,
  neighbor: u64,
}

impl std::fmt::Debug for EdgeEntry<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EdgeEntry")
      .field("neighbor", &self.neighbor)
      .field("rank", &self.rank)
      .finish()
  }
}

impl<'a> EdgeEntry<'a> {
  /// Lid stored in the entry (destination for OUT lists, source for IN)
  #[inline]
  pub fn neighbor(&self) -> u64 {
    self.neighbor
  }

  /// Chain-wide rank of the entry
  #[inline]
  pub fn rank(&self) -> u64 {
    self.rank
  }

  #[inline]
  pub(crate) fn block_offset(&self) -> ArenaOffset {
    self.block
  }

  #[inline]
  pub(crate) fn local_index(&self) -> u64 {
    self.local
  }

  /// Copy the entry's property bytes into `out`
  pub fn read_props(&self, out: &mut [u8]) {
    let block = EdgeBlock::at(self.arena, self.block);
    debug_assert!(out.len() as u64 <= block.prop_words() * WORD_BYTES);
    self.arena.read_bytes(block.props_offset(self.local), out);
  }

  /// Property bytes as an owned buffer of `len` bytes
  pub fn props(&self, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if len > 0 {
      self.read_props(&mut out);
    }
    out
  }
}

/// Live entries of one edge chain, newest first
pub struct EdgeIter<'a> {
  arena: &'a SharedArena,
  block: ArenaOffset,
  prev_num: u64,
  remaining: u64,
  cancelled: BinaryHeap<u64>,
}

impl<'a> EdgeIter<'a> {
  pub(crate) fn empty(arena: &'a SharedArena) -> Self {
    Self {
      arena,
      block: 0,
      prev_num: 0,
      remaining: 0,
      cancelled: BinaryHeap::new(),
    }
  }

  /// Iterate the first `num_entries` chain-wide entries ending at `block`
  pub(crate) fn new(arena: &'a SharedArena, block: ArenaOffset, num_entries: u64) -> Self {
    if block == 0 || num_entries == 0 {
      return Self::empty(arena);
    }
    let prev_num = EdgeBlock::at(arena, block).prev_num_entries();
    Self {
      arena,
      block,
      prev_num,
      remaining: num_entries,
      cancelled: BinaryHeap::new(),
    }
  }
}

impl<'a> Iterator for EdgeIter<'a> {
  type Item = EdgeEntry<'a>;

  fn next(&mut self) -> Option<EdgeEntry<'a>> {
    while self.remaining > 0 {
      let rank = self.remaining - 1;
      while rank < self.prev_num {
        let prev = EdgeBlock::at(self.arena, self.block).prev();
        assert_ne!(prev, 0, "edge chain truncated below rank {rank}");
        self.block = prev;
        self.prev_num = EdgeBlock::at(self.arena, prev).prev_num_entries();
      }
      self.remaining = rank;
      let local = rank - self.prev_num;
      let value = EdgeBlock::at(self.arena, self.block).entry(local);
      if value & TOMBSTONE_BIT != 0 {
        let target = value & PAYLOAD_MASK;
        assert!(target < rank, "tombstone at {rank} cancels later rank {target}");
        self.cancelled.push(target);
        continue;
      }
      if self.cancelled.peek() == Some(&rank) {
        self.cancelled.pop();
        continue;
      }
      return Some(EdgeEntry {
        arena: self.arena,
        block: self.block,
        local,
        rank,
        neighbor: value,
      });
    }
    None
  }
}

/// Read view of a segment graph bound to one epoch
#[derive(Clone, Copy)]
pub struct EpochGraphReader<'a> {
  view: &'a SegGraphView,
  epoch: Epoch,
}

impl<'a> EpochGraphReader<'a> {
  pub(crate) fn new(view: &'a SegGraphView, epoch: Epoch) -> Self {
    Self { view, epoch }
  }

  pub fn epoch(&self) -> Epoch {
    self.epoch
  }

  /// Edges of vertex `offset` with `label` in `dir` as of this reader's epoch
  pub fn edges(&self, offset: u64, label: LabelId, dir: Direction) -> EdgeIter<'a> {
    let arena = self.view.arena();
    let Some(head) = self.view.chain_head(offset, label, dir) else {
      return EdgeIter::empty(arena);
    };
    let table = arena.load(head + WORD_BYTES);
    if table == 0 {
      return EdgeIter::empty(arena);
    }
    match EpochTable::at(arena, table).find(self.epoch) {
      Some((block, num_entries)) => EdgeIter::new(arena, block, num_entries),
      None => EdgeIter::empty(arena),
    }
  }

  pub fn outgoing(&self, offset: u64, label: LabelId) -> EdgeIter<'a> {
    self.edges(offset, label, Direction::Out)
  }

  pub fn incoming(&self, offset: u64, label: LabelId) -> EdgeIter<'a> {
    self.edges(offset, label, Direction::In)
  }

  /// Live edge count of one list
  pub fn degree(&self, offset: u64, label: LabelId, dir: Direction) -> usize {
    self.edges(offset, label, dir).count()
  }
}
