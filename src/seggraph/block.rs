//! Edge block and epoch table layouts
//!
//! Edge block (power-of-two bytes):
//!
//! ```text
//! | order | num_entries | prev | prev_num_entries | capacity | prop_words | epoch | tombstones |
//! | entry[0] .. entry[capacity-1]                                                             |
//! | props[0] .. props[capacity-1]     (prop_words words each)                                 |
//! ```
//!
//! An entry is a neighbor lid, or `TOMBSTONE_BIT | rank` cancelling the live
//! entry at chain-wide `rank`. An entry's rank is
//! `prev_num_entries + local index`. `tombstones` counts tombstones in the
//! whole chain up to and including this block.
//!
//! Epoch table:
//!
//! ```text
//! | order | len | capacity | pad | (epoch, block, num_entries) * capacity |
//! ```
//!
//! `num_entries` is the chain-wide entry count visible at `epoch`.

use crate::constants::WORD_BYTES;
use crate::core::arena::SharedArena;
use crate::types::{ArenaOffset, Epoch};

pub(crate) const EDGE_BLOCK_HEADER_BYTES: u64 = 64;
const H_ORDER: u64 = 0;
const H_NUM: u64 = 8;
const H_PREV: u64 = 16;
const H_PREV_NUM: u64 = 24;
const H_CAPACITY: u64 = 32;
const H_PROP_WORDS: u64 = 40;
const H_EPOCH: u64 = 48;
const H_TOMBSTONES: u64 = 56;

pub(crate) const EPOCH_TABLE_HEADER_BYTES: u64 = 32;
pub(crate) const EPOCH_TABLE_ENTRY_BYTES: u64 = 24;
pub(crate) const EPOCH_TABLE_MIN_ORDER: u32 = 7;
const ET_ORDER: u64 = 0;
const ET_LEN: u64 = 8;
const ET_CAPACITY: u64 = 16;

/// Entries an edge block of `order` holds when each carries `prop_words`
pub(crate) fn edge_capacity(order: u32, prop_words: u64) -> u64 {
  ((1u64 << order) - EDGE_BLOCK_HEADER_BYTES) / (WORD_BYTES * (1 + prop_words))
}

/// Entries an epoch table of `order` holds
pub(crate) fn epoch_table_capacity(order: u32) -> u64 {
  ((1u64 << order) - EPOCH_TABLE_HEADER_BYTES) / EPOCH_TABLE_ENTRY_BYTES
}

/// Accessor for an edge block at a fixed offset
#[derive(Clone, Copy)]
pub(crate) struct EdgeBlock<'a> {
  arena: &'a SharedArena,
  at: ArenaOffset,
}

impl<'a> EdgeBlock<'a> {
  #[inline]
  pub fn at(arena: &'a SharedArena, at: ArenaOffset) -> Self {
    debug_assert_ne!(at, 0);
    Self { arena, at }
  }

  /// Write a fresh header; entries start empty
  #[allow(clippy::too_many_arguments)]
  pub fn init(
    arena: &'a SharedArena,
    at: ArenaOffset,
    order: u32,
    prop_words: u64,
    prev: ArenaOffset,
    prev_num_entries: u64,
    tombstones: u64,
    epoch: Epoch,
  ) -> Self {
    arena.store_relaxed(at + H_ORDER, order as u64);
    arena.store_relaxed(at + H_PREV, prev);
    arena.store_relaxed(at + H_PREV_NUM, prev_num_entries);
    arena.store_relaxed(at + H_CAPACITY, edge_capacity(order, prop_words));
    arena.store_relaxed(at + H_PROP_WORDS, prop_words);
    arena.store_relaxed(at + H_EPOCH, epoch);
    arena.store_relaxed(at + H_TOMBSTONES, tombstones);
    arena.store(at + H_NUM, 0);
    Self { arena, at }
  }

  #[inline]
  pub fn offset(&self) -> ArenaOffset {
    self.at
  }

  #[inline]
  pub fn order(&self) -> u32 {
    self.arena.load_relaxed(self.at + H_ORDER) as u32
  }

  #[inline]
  pub fn num_entries(&self) -> u64 {
    self.arena.load(self.at + H_NUM)
  }

  #[inline]
  pub fn prev(&self) -> ArenaOffset {
    self.arena.load_relaxed(self.at + H_PREV)
  }

  #[inline]
  pub fn prev_num_entries(&self) -> u64 {
    self.arena.load_relaxed(self.at + H_PREV_NUM)
  }

  #[inline]
  pub fn capacity(&self) -> u64 {
    self.arena.load_relaxed(self.at + H_CAPACITY)
  }

  #[inline]
  pub fn prop_words(&self) -> u64 {
    self.arena.load_relaxed(self.at + H_PROP_WORDS)
  }

  #[inline]
  pub fn created_epoch(&self) -> Epoch {
    self.arena.load_relaxed(self.at + H_EPOCH)
  }

  #[inline]
  pub fn tombstones(&self) -> u64 {
    self.arena.load_relaxed(self.at + H_TOMBSTONES)
  }

  /// Chain-wide entry count including this block
  #[inline]
  pub fn chain_entries(&self) -> u64 {
    self.prev_num_entries() + self.num_entries()
  }

  #[inline]
  pub fn entry(&self, local: u64) -> u64 {
    self.arena.load_relaxed(self.at + EDGE_BLOCK_HEADER_BYTES + local * WORD_BYTES)
  }

  #[inline]
  pub fn props_offset(&self, local: u64) -> ArenaOffset {
    self.at
      + EDGE_BLOCK_HEADER_BYTES
      + self.capacity() * WORD_BYTES
      + local * self.prop_words() * WORD_BYTES
  }

  /// Append one entry and its properties, then publish the new count
  pub fn push(&self, value: u64, props: &[u8], is_tombstone: bool) {
    let local = self.arena.load_relaxed(self.at + H_NUM);
    debug_assert!(local < self.capacity(), "edge block overflow");
    self
      .arena
      .store_relaxed(self.at + EDGE_BLOCK_HEADER_BYTES + local * WORD_BYTES, value);
    if !props.is_empty() {
      debug_assert!(props.len() as u64 <= self.prop_words() * WORD_BYTES);
      self.arena.write_bytes(self.props_offset(local), props);
    }
    if is_tombstone {
      let tombstones = self.tombstones();
      self.arena.store_relaxed(self.at + H_TOMBSTONES, tombstones + 1);
    }
    self.arena.store(self.at + H_NUM, local + 1);
  }

  /// Copy entry `local` of `self` (value and props) onto the end of `dst`
  pub fn copy_entry_to(&self, local: u64, dst: &EdgeBlock<'_>) {
    let words = self.prop_words();
    let dst_local = dst.arena.load_relaxed(dst.at + H_NUM);
    dst.arena.store_relaxed(
      dst.at + EDGE_BLOCK_HEADER_BYTES + dst_local * WORD_BYTES,
      self.entry(local),
    );
    if words > 0 {
      self
        .arena
        .copy_words(self.props_offset(local), dst.props_offset(dst_local), words);
    }
    dst.arena.store(dst.at + H_NUM, dst_local + 1);
  }
}

/// Accessor for an epoch table at a fixed offset
#[derive(Clone, Copy)]
pub(crate) struct EpochTable<'a> {
  arena: &'a SharedArena,
  at: ArenaOffset,
}

impl<'a> EpochTable<'a> {
  #[inline]
  pub fn at(arena: &'a SharedArena, at: ArenaOffset) -> Self {
    Self { arena, at }
  }

  pub fn init(arena: &'a SharedArena, at: ArenaOffset, order: u32) -> Self {
    arena.store_relaxed(at + ET_ORDER, order as u64);
    arena.store_relaxed(at + ET_CAPACITY, epoch_table_capacity(order));
    arena.store(at + ET_LEN, 0);
    Self { arena, at }
  }

  #[inline]
  pub fn offset(&self) -> ArenaOffset {
    self.at
  }

  #[inline]
  pub fn order(&self) -> u32 {
    self.arena.load_relaxed(self.at + ET_ORDER) as u32
  }

  #[inline]
  pub fn len(&self) -> u64 {
    self.arena.load(self.at + ET_LEN)
  }

  #[inline]
  pub fn capacity(&self) -> u64 {
    self.arena.load_relaxed(self.at + ET_CAPACITY)
  }

  #[inline]
  fn slot(&self, index: u64) -> ArenaOffset {
    self.at + EPOCH_TABLE_HEADER_BYTES + index * EPOCH_TABLE_ENTRY_BYTES
  }

  /// `(epoch, block, num_entries)` at `index`
  #[inline]
  pub fn entry(&self, index: u64) -> (Epoch, ArenaOffset, u64) {
    let slot = self.slot(index);
    (
      self.arena.load_relaxed(slot),
      self.arena.load_relaxed(slot + 8),
      self.arena.load_relaxed(slot + 16),
    )
  }

  /// Newest checkpoint with `epoch <= read_epoch`
  pub fn find(&self, read_epoch: Epoch) -> Option<(ArenaOffset, u64)> {
    let len = self.len();
    (0..len).rev().find_map(|index| {
      let (epoch, block, num) = self.entry(index);
      (epoch <= read_epoch).then_some((block, num))
    })
  }

  /// Overwrite the newest entry in place (same epoch)
  pub fn update_last(&self, block: ArenaOffset, num_entries: u64) {
    let slot = self.slot(self.len() - 1);
    self.arena.store(slot + 8, block);
    self.arena.store(slot + 16, num_entries);
  }

  /// Append an entry. The caller checks capacity.
  pub fn push(&self, epoch: Epoch, block: ArenaOffset, num_entries: u64) {
    let len = self.arena.load_relaxed(self.at + ET_LEN);
    debug_assert!(len < self.capacity());
    let slot = self.slot(len);
    self.arena.store_relaxed(slot, epoch);
    self.arena.store_relaxed(slot + 8, block);
    self.arena.store_relaxed(slot + 16, num_entries);
    self.arena.store(self.at + ET_LEN, len + 1);
  }

  /// Copy all entries into `dst` (which must be empty and large enough)
  pub fn copy_to(&self, dst: &EpochTable<'_>) {
    let len = self.len();
    debug_assert!(len <= dst.capacity());
    self.arena.copy_words(
      self.slot(0),
      dst.slot(0),
      len * EPOCH_TABLE_ENTRY_BYTES / WORD_BYTES,
    );
    dst.arena.store(dst.at + ET_LEN, len);
  }
}
