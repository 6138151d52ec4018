//! Versioned open-addressed hashmap over a shared arena
//!
//! Maps u64 keys to u64 values (gid to outer lid, external id to gid). Each
//! slot records the epoch it was inserted and, once removed, the epoch it was
//! deleted; a reader bound to epoch E only sees slots with
//! `insert <= E < delete`. Slots are never reused, so a published generation
//! only ever gains slots. When a generation fills up the writer copies every
//! slot, history included, into a fresh blob twice the size. Readers bound to
//! older epochs keep the generation their metadata named.
//!
//! Slot layout (4 words): `key | value | insert_epoch + 1 | delete_epoch + 1`.
//! A zero insert word marks an empty slot and ends a probe sequence.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use xxhash_rust::xxh64::xxh64;

use crate::constants::{ARENA_RESERVED_BYTES, WORD_BYTES};
use crate::core::arena::{BlobStore, SharedArena};
use crate::error::{GraphError, Result};
use crate::types::{BlobId, Epoch};

const SLOT_WORDS: u64 = 4;
const KEY: u64 = 0;
const VALUE: u64 = 1;
const INSERTED: u64 = 2;
const DELETED: u64 = 3;

/// Published handle of one map generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapMeta {
  pub blob: BlobId,
  pub capacity: u64,
}

#[inline]
fn slot_offset(slot: u64) -> u64 {
  ARENA_RESERVED_BYTES + slot * SLOT_WORDS * WORD_BYTES
}

#[inline]
fn field(slot: u64, word: u64) -> u64 {
  slot_offset(slot) + word * WORD_BYTES
}

#[inline]
fn home_slot(key: u64, capacity: u64) -> u64 {
  xxh64(&key.to_le_bytes(), 0) & (capacity - 1)
}

// ============================================================================
// Read side
// ============================================================================

/// Read-only view of one generation
#[derive(Debug, Clone)]
pub struct MapView {
  arena: Arc<SharedArena>,
  capacity: u64,
}

impl MapView {
  pub fn attach(store: &dyn BlobStore, meta: MapMeta) -> Result<Self> {
    let arena = store.attach(meta.blob).ok_or(GraphError::BlobNotFound(meta.blob))?;
    Ok(Self {
      arena,
      capacity: meta.capacity,
    })
  }

  /// Value visible for `key` as of `epoch`
  pub fn get(&self, key: u64, epoch: Epoch) -> Option<u64> {
    let mut slot = home_slot(key, self.capacity);
    for _ in 0..self.capacity {
      let inserted = self.arena.load(field(slot, INSERTED));
      if inserted == 0 {
        return None;
      }
      if inserted - 1 <= epoch && self.arena.load_relaxed(field(slot, KEY)) == key {
        let deleted = self.arena.load(field(slot, DELETED));
        if deleted == 0 || deleted - 1 > epoch {
          return Some(self.arena.load_relaxed(field(slot, VALUE)));
        }
      }
      slot = (slot + 1) & (self.capacity - 1);
    }
    None
  }

  /// Live entries as of `epoch`
  pub fn len_at(&self, epoch: Epoch) -> usize {
    (0..self.capacity)
      .filter(|&slot| {
        let inserted = self.arena.load(field(slot, INSERTED));
        let deleted = self.arena.load(field(slot, DELETED));
        inserted != 0 && inserted - 1 <= epoch && (deleted == 0 || deleted - 1 > epoch)
      })
      .count()
  }
}

// ============================================================================
// Write side
// ============================================================================

/// Writer of a versioned map
pub struct VersionedMap {
  name: &'static str,
  store: Arc<dyn BlobStore>,
  blob: BlobId,
  arena: Arc<SharedArena>,
  capacity: u64,
  used: u64,
  live: u64,
}

impl std::fmt::Debug for VersionedMap {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("VersionedMap")
      .field("name", &self.name)
      .field("blob", &self.blob)
      .field("capacity", &self.capacity)
      .field("used", &self.used)
      .field("live", &self.live)
      .finish()
  }
}

impl VersionedMap {
  pub fn new(store: Arc<dyn BlobStore>, name: &'static str, capacity: u64) -> Result<Self> {
    let capacity = capacity.max(4).next_power_of_two();
    let handle = store.allocate(slot_offset(capacity))?;
    Ok(Self {
      name,
      store,
      blob: handle.id,
      arena: handle.arena,
      capacity,
      used: 0,
      live: 0,
    })
  }

  /// Handle of the current generation
  pub fn meta(&self) -> MapMeta {
    MapMeta {
      blob: self.blob,
      capacity: self.capacity,
    }
  }

  pub fn view(&self) -> MapView {
    MapView {
      arena: Arc::clone(&self.arena),
      capacity: self.capacity,
    }
  }

  /// Keys currently live
  pub fn len(&self) -> u64 {
    self.live
  }

  pub fn is_empty(&self) -> bool {
    self.live == 0
  }

  fn find_live(&self, key: u64) -> Option<u64> {
    let mut slot = home_slot(key, self.capacity);
    for _ in 0..self.capacity {
      let inserted = self.arena.load(field(slot, INSERTED));
      if inserted == 0 {
        return None;
      }
      if self.arena.load_relaxed(field(slot, KEY)) == key
        && self.arena.load(field(slot, DELETED)) == 0
      {
        return Some(slot);
      }
      slot = (slot + 1) & (self.capacity - 1);
    }
    None
  }

  /// Newest live value regardless of epoch
  pub fn get_latest(&self, key: u64) -> Option<u64> {
    self
      .find_live(key)
      .map(|slot| self.arena.load_relaxed(field(slot, VALUE)))
  }

  /// Map `key` to `value` from `epoch` on, retiring any live mapping
  pub fn insert(&mut self, key: u64, value: u64, epoch: Epoch) -> Result<()> {
    self.remove(key, epoch);
    if (self.used + 1) * 4 > self.capacity * 3 {
      self.grow()?;
    }
    write_slot(&self.arena, self.capacity, key, value, epoch + 1, 0);
    self.used += 1;
    self.live += 1;
    Ok(())
  }

  /// Hide `key` from readers at `epoch` and later. Returns false if absent.
  pub fn remove(&mut self, key: u64, epoch: Epoch) -> bool {
    match self.find_live(key) {
      Some(slot) => {
        self.arena.store(field(slot, DELETED), epoch + 1);
        self.live -= 1;
        true
      }
      None => false,
    }
  }

  fn grow(&mut self) -> Result<()> {
    let capacity = self.capacity * 2;
    let handle = self.store.allocate(slot_offset(capacity))?;
    for slot in 0..self.capacity {
      let inserted = self.arena.load(field(slot, INSERTED));
      if inserted == 0 {
        continue;
      }
      write_slot(
        &handle.arena,
        capacity,
        self.arena.load_relaxed(field(slot, KEY)),
        self.arena.load_relaxed(field(slot, VALUE)),
        inserted,
        self.arena.load(field(slot, DELETED)),
      );
    }
    debug!(
      map = self.name,
      from = self.capacity,
      to = capacity,
      blob = handle.id,
      "versioned map generation grown"
    );
    self.blob = handle.id;
    self.arena = handle.arena;
    self.capacity = capacity;
    Ok(())
  }
}

fn write_slot(
  arena: &SharedArena,
  capacity: u64,
  key: u64,
  value: u64,
  inserted: u64,
  deleted: u64,
) {
  let mut slot = home_slot(key, capacity);
  while arena.load_relaxed(field(slot, INSERTED)) != 0 {
    slot = (slot + 1) & (capacity - 1);
  }
  arena.store_relaxed(field(slot, KEY), key);
  arena.store_relaxed(field(slot, VALUE), value);
  arena.store_relaxed(field(slot, DELETED), deleted);
  arena.store(field(slot, INSERTED), inserted);
}
