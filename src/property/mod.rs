//! Property storage
//!
//! Vertex properties of one label are split into column families. Each
//! family is stored either as a flat fixed array (never updated) or as pages
//! carrying their own version chains (`paged`). Edge properties are encoded
//! into a fixed-width record stored next to the edge entry in its block.

pub mod paged;

use serde::{Deserialize, Serialize};

use crate::core::string_buffer::{StringBuffer, StringBufferView};
use crate::error::Result;
use crate::types::{DataType, PropId, PropValue};
use crate::util::codec::{
  bitmap_get, bitmap_set, decode_cell, encode_cell, null_bitmap_bytes, read_surrogate,
};

pub use paged::{FamilyMeta, PagedPropertyStore, PagedPropertyView};

/// One property inside a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
  pub prop: PropId,
  pub dtype: DataType,
  /// Byte offset inside the row
  pub offset: u64,
}

/// Physical layout of one column family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyLayout {
  pub updatable: bool,
  pub rows_per_page: u64,
  pub columns: Vec<ColumnLayout>,
  pub row_bytes: u64,
}

impl FamilyLayout {
  pub fn new(updatable: bool, rows_per_page: u64, props: &[(PropId, DataType)]) -> Self {
    let mut offset = 0u64;
    let columns = props
      .iter()
      .map(|&(prop, dtype)| {
        let column = ColumnLayout {
          prop,
          dtype,
          offset,
        };
        offset += dtype.width() as u64;
        column
      })
      .collect();
    Self {
      updatable,
      rows_per_page,
      columns,
      row_bytes: offset,
    }
  }
}

/// Where a property lives: family index and column index inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropSlot {
  pub family: usize,
  pub column: usize,
}

/// Property layout of one vertex label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyLayout {
  pub families: Vec<FamilyLayout>,
  /// Indexed by property id
  pub slots: Vec<PropSlot>,
}

impl PropertyLayout {
  pub fn prop_num(&self) -> usize {
    self.slots.len()
  }

  pub fn dtype(&self, prop: PropId) -> Option<DataType> {
    let slot = self.slots.get(prop as usize)?;
    Some(self.families[slot.family].columns[slot.column].dtype)
  }
}

/// Fixed-width edge property record: null bitmap, then cells
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePropLayout {
  pub dtypes: Vec<DataType>,
  pub offsets: Vec<u64>,
  pub bitmap_bytes: u64,
  pub total_bytes: u64,
}

impl EdgePropLayout {
  pub fn new(dtypes: Vec<DataType>) -> Self {
    if dtypes.is_empty() {
      return Self {
        dtypes,
        offsets: Vec::new(),
        bitmap_bytes: 0,
        total_bytes: 0,
      };
    }
    let bitmap_bytes = null_bitmap_bytes(dtypes.len()) as u64;
    let mut offset = bitmap_bytes;
    let offsets = dtypes
      .iter()
      .map(|dtype| {
        let at = offset;
        offset += dtype.width() as u64;
        at
      })
      .collect();
    Self {
      dtypes,
      offsets,
      bitmap_bytes,
      total_bytes: offset,
    }
  }

  pub fn prop_num(&self) -> usize {
    self.dtypes.len()
  }

  /// Encode one edge's values, interning strings into `strings`
  pub fn encode(&self, values: &[Option<PropValue>], strings: &StringBuffer) -> Result<Vec<u8>> {
    debug_assert_eq!(values.len(), self.dtypes.len());
    let mut record = vec![0u8; self.total_bytes as usize];
    let (bitmap, cells) = record.split_at_mut(self.bitmap_bytes as usize);
    for (index, value) in values.iter().enumerate() {
      let Some(value) = value else { continue };
      let surrogate = match value {
        PropValue::String(s) => strings.append(s)?,
        _ => 0,
      };
      if matches!(value, PropValue::String(_)) && surrogate == 0 {
        continue;
      }
      bitmap_set(bitmap, index, true);
      let at = (self.offsets[index] - self.bitmap_bytes) as usize;
      let width = self.dtypes[index].width();
      encode_cell(value, surrogate, &mut cells[at..at + width]);
    }
    Ok(record)
  }

  /// Decode property `prop` from a record; `None` when null or unknown
  pub fn decode(
    &self,
    record: &[u8],
    prop: PropId,
    strings: &StringBufferView,
  ) -> Option<PropValue> {
    let index = prop as usize;
    let dtype = *self.dtypes.get(index)?;
    if !bitmap_get(&record[..self.bitmap_bytes as usize], index) {
      return None;
    }
    let at = self.offsets[index] as usize;
    let cell = &record[at..at + dtype.width()];
    if dtype == DataType::String && read_surrogate(cell) & 0xFFFF == 0 {
      return None;
    }
    decode_cell(dtype, cell, |s| strings.get(s))
  }
}
