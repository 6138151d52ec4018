//! Per-label vertex table
//!
//! One array of slots shared by two frontiers: inner vertices are appended
//! upward from location 0, outer (mirror) vertices downward from the end.
//! A live slot holds the vertex offset (inner) or mirror index (outer). A
//! deletion appends a tombstone slot `TOMBSTONE_BIT | location` at the same
//! frontier, pointing back at the slot it cancels.
//!
//! Iteration walks from the frontier back toward the table edge, so every
//! tombstone is seen before the slot it cancels. Pending cancellations sit in
//! a heap and are matched as the scan reaches them.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::constants::{PAYLOAD_MASK, WORD_BYTES};
use crate::core::arena::{BlobStore, SharedArena};
use crate::error::{GraphError, Result};
use crate::types::{BlobId, LabelId};
use crate::util::id_parser::IdParser;

/// Frontiers of a vertex table as published for one epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexTableMeta {
  pub blob: BlobId,
  pub capacity: u64,
  /// One past the newest inner slot
  pub max_inner_location: u64,
  /// Oldest outer slot (== capacity when none)
  pub min_outer_location: u64,
  /// One past the largest inner vertex offset ever added
  pub inner_offset_bound: u64,
  /// Mirror indices handed out so far
  pub outer_num: u64,
}

#[derive(Debug)]
pub struct VertexTable {
  label: LabelId,
  blob: BlobId,
  arena: Arc<SharedArena>,
  capacity: u64,
  max_inner_location: u64,
  min_outer_location: u64,
  inner_offset_bound: u64,
  outer_num: u64,
  inner_locations: HashMap<u64, u64>,
  outer_locations: HashMap<u64, u64>,
}

impl VertexTable {
  pub fn new(store: &dyn BlobStore, label: LabelId, capacity: u64) -> Result<Self> {
    let handle = store.allocate(capacity * WORD_BYTES)?;
    Ok(Self {
      label,
      blob: handle.id,
      arena: handle.arena,
      capacity,
      max_inner_location: 0,
      min_outer_location: capacity,
      inner_offset_bound: 0,
      outer_num: 0,
      inner_locations: HashMap::new(),
      outer_locations: HashMap::new(),
    })
  }

  fn claim_inner_slot(&mut self) -> Result<u64> {
    if self.max_inner_location >= self.min_outer_location {
      return Err(GraphError::VertexTableFull { label: self.label });
    }
    let location = self.max_inner_location;
    self.max_inner_location += 1;
    Ok(location)
  }

  fn claim_outer_slot(&mut self) -> Result<u64> {
    if self.min_outer_location <= self.max_inner_location {
      return Err(GraphError::VertexTableFull { label: self.label });
    }
    self.min_outer_location -= 1;
    Ok(self.min_outer_location)
  }

  /// Record inner vertex `offset` as live
  pub fn add_inner(&mut self, offset: u64) -> Result<()> {
    assert!(
      !self.inner_locations.contains_key(&offset),
      "inner vertex {offset} added twice"
    );
    let location = self.claim_inner_slot()?;
    self.arena.store(location * WORD_BYTES, offset);
    self.inner_locations.insert(offset, location);
    self.inner_offset_bound = self.inner_offset_bound.max(offset + 1);
    Ok(())
  }

  /// Claim the next mirror index
  pub fn add_outer(&mut self) -> Result<u64> {
    let location = self.claim_outer_slot()?;
    let ov = self.outer_num;
    self.arena.store(location * WORD_BYTES, ov);
    self.outer_locations.insert(ov, location);
    self.outer_num += 1;
    Ok(ov)
  }

  /// Tombstone inner vertex `offset`. Returns false if it is not live.
  pub fn delete_inner(&mut self, offset: u64) -> Result<bool> {
    let Some(&location) = self.inner_locations.get(&offset) else {
      return Ok(false);
    };
    let tombstone = self.claim_inner_slot()?;
    self.arena.store(
      tombstone * WORD_BYTES,
      IdParser::generate_deleted_id(location),
    );
    self.inner_locations.remove(&offset);
    Ok(true)
  }

  /// Tombstone mirror `ov`. Returns false if it is not live.
  pub fn delete_outer(&mut self, ov: u64) -> Result<bool> {
    let Some(&location) = self.outer_locations.get(&ov) else {
      return Ok(false);
    };
    let tombstone = self.claim_outer_slot()?;
    self.arena.store(
      tombstone * WORD_BYTES,
      IdParser::generate_deleted_id(location),
    );
    self.outer_locations.remove(&ov);
    Ok(true)
  }

  pub fn is_inner_live(&self, offset: u64) -> bool {
    self.inner_locations.contains_key(&offset)
  }

  pub fn is_outer_live(&self, ov: u64) -> bool {
    self.outer_locations.contains_key(&ov)
  }

  pub fn inner_live_count(&self) -> u64 {
    self.inner_locations.len() as u64
  }

  pub fn outer_live_count(&self) -> u64 {
    self.outer_locations.len() as u64
  }

  pub fn meta(&self) -> VertexTableMeta {
    VertexTableMeta {
      blob: self.blob,
      capacity: self.capacity,
      max_inner_location: self.max_inner_location,
      min_outer_location: self.min_outer_location,
      inner_offset_bound: self.inner_offset_bound,
      outer_num: self.outer_num,
    }
  }

  pub fn view(&self) -> VertexTableView {
    VertexTableView {
      arena: Arc::clone(&self.arena),
      meta: self.meta(),
    }
  }
}

// ============================================================================
// Read side
// ============================================================================

/// Vertex table frozen at published frontiers
#[derive(Debug, Clone)]
pub struct VertexTableView {
  arena: Arc<SharedArena>,
  meta: VertexTableMeta,
}

impl VertexTableView {
  pub fn attach(store: &dyn BlobStore, meta: VertexTableMeta) -> Result<Self> {
    let arena = store.attach(meta.blob).ok_or(GraphError::BlobNotFound(meta.blob))?;
    Ok(Self { arena, meta })
  }

  pub fn meta(&self) -> &VertexTableMeta {
    &self.meta
  }

  /// Live inner vertex offsets, newest first
  pub fn inner(&self) -> InnerSlots<'_> {
    InnerSlots {
      arena: &self.arena,
      next: self.meta.max_inner_location,
      cancelled: BinaryHeap::new(),
    }
  }

  /// Live mirror indices, newest first
  pub fn outer(&self) -> OuterSlots<'_> {
    OuterSlots {
      arena: &self.arena,
      next: self.meta.min_outer_location,
      end: self.meta.capacity,
      cancelled: BinaryHeap::new(),
    }
  }
}

/// Descending scan over inner slots
#[derive(Debug)]
pub struct InnerSlots<'a> {
  arena: &'a SharedArena,
  next: u64,
  cancelled: BinaryHeap<u64>,
}

impl Iterator for InnerSlots<'_> {
  type Item = u64;

  fn next(&mut self) -> Option<u64> {
    while self.next > 0 {
      self.next -= 1;
      let location = self.next;
      let value = self.arena.load(location * WORD_BYTES);
      if IdParser::is_deleted_id(value) {
        self.cancelled.push(value & PAYLOAD_MASK);
        continue;
      }
      if self.cancelled.peek() == Some(&location) {
        self.cancelled.pop();
        continue;
      }
      return Some(value);
    }
    None
  }
}

/// Ascending scan over outer slots
#[derive(Debug)]
pub struct OuterSlots<'a> {
  arena: &'a SharedArena,
  next: u64,
  end: u64,
  cancelled: BinaryHeap<Reverse<u64>>,
}

impl Iterator for OuterSlots<'_> {
  type Item = u64;

  fn next(&mut self) -> Option<u64> {
    while self.next < self.end {
      let location = self.next;
      self.next += 1;
      let value = self.arena.load(location * WORD_BYTES);
      if IdParser::is_deleted_id(value) {
        self.cancelled.push(Reverse(value & PAYLOAD_MASK));
        continue;
      }
      if self.cancelled.peek() == Some(&Reverse(location)) {
        self.cancelled.pop();
        continue;
      }
      return Some(value);
    }
    None
  }
}
