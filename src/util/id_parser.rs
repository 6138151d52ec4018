//! Vertex id codec
//!
//! A 64-bit global id packs, from the low bits up: the owning partition
//! (`fid`), the vertex offset, and the label. The top bit is never set in a
//! valid id so it stays free for tombstone markers.
//!
//! ```text
//! | 1 reserved | label | offset | fid |
//! ```
//!
//! Outer (mirror) vertices mirror their offset as `max_offset - ov`, which
//! keeps inner and outer local ids in disjoint ranges of the same label.

use crate::constants::{MAX_VERTEX_LABELS, TOMBSTONE_BIT};
use crate::types::{Gid, LabelId, Lid};

/// Bits needed to distinguish `n` values (at least one)
pub fn num_to_bitwidth(n: u64) -> u32 {
  if n <= 2 {
    1
  } else {
    64 - (n - 1).leading_zeros()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParser {
  fnum: u64,
  label_num: usize,
  fid_width: u32,
  label_width: u32,
  offset_width: u32,
  fid_mask: u64,
  offset_mask: u64,
  label_mask: u64,
  lid_mask: u64,
}

impl IdParser {
  /// Compute field widths for `fnum` partitions and `label_num` vertex labels.
  ///
  /// Panics when `label_num` exceeds the reserved label bits or `fnum` is zero.
  pub fn new(fnum: u64, label_num: usize) -> Self {
    assert!(fnum > 0, "partition count must be positive");
    assert!(
      label_num <= MAX_VERTEX_LABELS,
      "label count {label_num} exceeds {MAX_VERTEX_LABELS}"
    );
    let fid_width = num_to_bitwidth(fnum);
    let label_width = num_to_bitwidth(MAX_VERTEX_LABELS as u64);
    let offset_width = 64 - fid_width - label_width - 1;

    let fid_mask = (1u64 << fid_width) - 1;
    let offset_mask = ((1u64 << offset_width) - 1) << fid_width;
    let label_mask = ((1u64 << label_width) - 1) << (offset_width + fid_width);
    Self {
      fnum,
      label_num,
      fid_width,
      label_width,
      offset_width,
      fid_mask,
      offset_mask,
      label_mask,
      lid_mask: offset_mask | label_mask,
    }
  }

  pub fn fnum(&self) -> u64 {
    self.fnum
  }

  pub fn label_num(&self) -> usize {
    self.label_num
  }

  pub fn offset_width(&self) -> u32 {
    self.offset_width
  }

  /// Largest representable offset
  #[inline]
  pub fn max_offset(&self) -> u64 {
    (1u64 << self.offset_width) - 1
  }

  #[inline]
  pub fn generate_id(&self, fid: u64, label: LabelId, offset: u64) -> Gid {
    assert!(fid < self.fnum, "fid {fid} out of range");
    assert!((label as usize) < self.label_num, "label {label} out of range");
    assert!(offset <= self.max_offset(), "offset {offset} out of range");
    ((label as u64) << (self.offset_width + self.fid_width)) | (offset << self.fid_width) | fid
  }

  /// Local id for an inner vertex: same packing with the fid cleared
  #[inline]
  pub fn generate_lid(&self, label: LabelId, offset: u64) -> Lid {
    self.generate_id(0, label, offset)
  }

  /// Id of the `ov`-th mirror vertex of a label
  #[inline]
  pub fn generate_outer_id(&self, fid: u64, label: LabelId, ov: u64) -> Gid {
    self.generate_id(fid, label, self.max_offset() - ov)
  }

  /// Mirror a vertex offset into the outer range (self-inverse)
  #[inline]
  pub fn mirror_offset(&self, offset: u64) -> u64 {
    self.max_offset() - offset
  }

  /// Vertex-table slot value recording that `location` was deleted
  #[inline]
  pub fn generate_deleted_id(location: u64) -> u64 {
    location | TOMBSTONE_BIT
  }

  #[inline]
  pub fn is_deleted_id(value: u64) -> bool {
    value & TOMBSTONE_BIT != 0
  }

  #[inline]
  pub fn get_fid(&self, id: u64) -> u64 {
    id & self.fid_mask
  }

  #[inline]
  pub fn get_label_id(&self, id: u64) -> LabelId {
    ((id & self.label_mask) >> (self.offset_width + self.fid_width)) as LabelId
  }

  #[inline]
  pub fn get_offset(&self, id: u64) -> u64 {
    (id & self.offset_mask) >> self.fid_width
  }

  /// Strip the partition bits from a global id
  #[inline]
  pub fn get_lid(&self, gid: Gid) -> Lid {
    gid & self.lid_mask
  }

  #[inline]
  pub fn lid_to_gid(&self, lid: Lid, fid: u64) -> Gid {
    debug_assert!(fid < self.fnum);
    (lid & self.lid_mask) | fid
  }
}
