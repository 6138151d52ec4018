//! Power-of-two block allocator over one shared arena
//!
//! Blocks are identified by byte offset, never by pointer, so a reader that
//! attaches the same blob resolves them against its own base. Small orders are
//! recycled through sharded free lists (each thread sticks to one shard),
//! large orders through a single mutex-protected list. Otherwise a bump
//! cursor hands out fresh space. Memory is never returned to the arena.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::constants::{ARENA_RESERVED_BYTES, MAX_BLOCK_ORDER, MIN_BLOCK_ORDER};
use crate::core::arena::{BlobStore, SharedArena};
use crate::error::{GraphError, Result};
use crate::types::{ArenaOffset, BlobId};

const FREE_LIST_SHARDS: usize = 16;

static NEXT_THREAD_SHARD: AtomicUsize = AtomicUsize::new(0);

thread_local! {
  static THREAD_SHARD: Cell<usize> =
    Cell::new(NEXT_THREAD_SHARD.fetch_add(1, Ordering::Relaxed) % FREE_LIST_SHARDS);
}

/// Free blocks bucketed by order
#[derive(Debug, Default)]
struct FreeLists {
  by_order: Vec<Vec<ArenaOffset>>,
}

impl FreeLists {
  fn pop(&mut self, order: u32) -> Option<ArenaOffset> {
    self.by_order.get_mut(order as usize).and_then(Vec::pop)
  }

  fn push(&mut self, order: u32, offset: ArenaOffset) {
    let order = order as usize;
    if self.by_order.len() <= order {
      self.by_order.resize_with(order + 1, Vec::new);
    }
    self.by_order[order].push(offset);
  }

  fn len(&self) -> usize {
    self.by_order.iter().map(Vec::len).sum()
  }
}

/// Allocator statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockStats {
  /// Bytes handed out by the bump cursor (including reserved header)
  pub bump_bytes: u64,
  /// Bytes backed by memory
  pub committed_bytes: u64,
  /// Blocks waiting on free lists
  pub free_blocks: usize,
  pub capacity: u64,
}

#[derive(Debug)]
pub struct BlockManager {
  name: &'static str,
  blob: BlobId,
  arena: Arc<SharedArena>,
  capacity: u64,
  cursor: AtomicU64,
  large_order: u32,
  small_free: Box<[Mutex<FreeLists>]>,
  large_free: Mutex<FreeLists>,
  exhausted: AtomicBool,
}

impl BlockManager {
  /// Allocate a fresh arena of `capacity` bytes from `store`
  pub fn new(
    store: &dyn BlobStore,
    name: &'static str,
    capacity: u64,
    large_order: u32,
  ) -> Result<Self> {
    let handle = store.allocate(capacity)?;
    let small_free = (0..FREE_LIST_SHARDS)
      .map(|_| Mutex::new(FreeLists::default()))
      .collect();
    Ok(Self {
      name,
      blob: handle.id,
      capacity: handle.arena.capacity(),
      arena: handle.arena,
      // The reserved prefix keeps offset 0 free to mean null
      cursor: AtomicU64::new(ARENA_RESERVED_BYTES),
      large_order,
      small_free,
      large_free: Mutex::new(FreeLists::default()),
      exhausted: AtomicBool::new(false),
    })
  }

  pub fn blob(&self) -> BlobId {
    self.blob
  }

  pub fn arena(&self) -> &Arc<SharedArena> {
    &self.arena
  }

  /// Smallest order whose block holds `bytes`
  pub fn order_for(bytes: u64) -> u32 {
    let bytes = bytes.max(1 << MIN_BLOCK_ORDER);
    64 - (bytes - 1).leading_zeros()
  }

  /// Allocate a block of `2^order` bytes and return its offset
  pub fn alloc(&self, order: u32) -> Result<ArenaOffset> {
    assert!(
      (MIN_BLOCK_ORDER..=MAX_BLOCK_ORDER).contains(&order),
      "block order {order} out of range"
    );
    let recycled = if order < self.large_order {
      let shard = THREAD_SHARD.with(Cell::get);
      self.small_free[shard].lock().pop(order)
    } else {
      self.large_free.lock().pop(order)
    };
    if let Some(offset) = recycled {
      return Ok(offset);
    }

    let size = 1u64 << order;
    let offset = self.cursor.fetch_add(size, Ordering::Relaxed);
    if offset + size > self.capacity {
      if !self.exhausted.swap(true, Ordering::Relaxed) {
        error!(
          arena = self.name,
          capacity = self.capacity,
          requested = size,
          "block allocator out of capacity"
        );
      }
      return Err(GraphError::OutOfCapacity {
        what: self.name,
        requested: size,
        capacity: self.capacity,
      });
    }
    self.arena.ensure(offset + size);
    Ok(offset)
  }

  /// Return a block to the free list of its order
  pub fn free(&self, offset: ArenaOffset, order: u32) {
    assert_ne!(offset, 0, "freeing the null block");
    if order < self.large_order {
      let shard = THREAD_SHARD.with(Cell::get);
      self.small_free[shard].lock().push(order, offset);
    } else {
      self.large_free.lock().push(order, offset);
    }
  }

  pub fn stats(&self) -> BlockStats {
    let free_blocks = self.small_free.iter().map(|s| s.lock().len()).sum::<usize>()
      + self.large_free.lock().len();
    BlockStats {
      bump_bytes: self.cursor.load(Ordering::Relaxed).min(self.capacity),
      committed_bytes: self.arena.committed_bytes(),
      free_blocks,
      capacity: self.capacity,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::arena::LocalBlobStore;

  fn manager(capacity: u64) -> BlockManager {
    let store = LocalBlobStore::new("test", 4096);
    BlockManager::new(&store, "test arena", capacity, 10).unwrap()
  }

  #[test]
  fn test_order_for() {
    assert_eq!(BlockManager::order_for(1), MIN_BLOCK_ORDER);
    assert_eq!(BlockManager::order_for(64), 6);
    assert_eq!(BlockManager::order_for(65), 7);
  }

  #[test]
  fn test_never_hands_out_null() {
    let blocks = manager(1 << 16);
    let first = blocks.alloc(3).unwrap();
    assert!(first >= ARENA_RESERVED_BYTES);
  }

  #[test]
  fn test_small_blocks_are_recycled_on_same_thread() {
    let blocks = manager(1 << 16);
    let a = blocks.alloc(6).unwrap();
    blocks.free(a, 6);
    assert_eq!(blocks.stats().free_blocks, 1);
    assert_eq!(blocks.alloc(6).unwrap(), a);
    assert_ne!(blocks.alloc(6).unwrap(), a);
  }

  #[test]
  fn test_large_blocks_share_one_list() {
    let blocks = Arc::new(manager(1 << 16));
    let a = blocks.alloc(11).unwrap();
    blocks.free(a, 11);
    let other = Arc::clone(&blocks);
    let reused = std::thread::spawn(move || other.alloc(11).unwrap())
      .join()
      .unwrap();
    assert_eq!(reused, a);
  }

  #[test]
  fn test_out_of_capacity() {
    let blocks = manager(1024);
    blocks.alloc(9).unwrap();
    let err = blocks.alloc(9).unwrap_err();
    assert!(matches!(err, GraphError::OutOfCapacity { .. }));
    assert!(blocks.alloc(9).is_err());
  }

  #[test]
  fn test_commits_memory_as_cursor_grows() {
    let blocks = manager(1 << 20);
    let before = blocks.stats().committed_bytes;
    blocks.alloc(14).unwrap();
    assert!(blocks.stats().committed_bytes > before);
  }
}
