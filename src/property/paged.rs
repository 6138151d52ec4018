//! Multi-version paged column families
//!
//! An updatable family divides its rows into pages of `rows_per_page`. The
//! page directory holds, per page, the newest page version; older versions
//! hang off its `prev` link.
//!
//! ```text
//! | version | min_version | prev | reserved | null bitmap | rows ... |
//! ```
//!
//! `min_version` is the oldest version still reachable through `prev`, so a
//! lookup older than the whole chain ends without walking it. A bitmap bit is
//! set when the cell holds a value. Updates copy the page only when a value of
//! the family actually changed, and only once per epoch.
//!
//! A fixed family is one flat region (bitmap, then rows) written in place.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StoreConfig;
use crate::constants::{ARENA_RESERVED_BYTES, WORD_BYTES};
use crate::core::arena::{BlobStore, SharedArena};
use crate::core::block_manager::BlockManager;
use crate::core::string_buffer::{StringBuffer, StringBufferView};
use crate::error::{GraphError, Result};
use crate::property::{FamilyLayout, PropertyLayout};
use crate::types::{ArenaOffset, BlobId, Epoch, LabelId, PropId, PropValue};
use crate::util::codec::{decode_cell, encode_cell, read_surrogate};

const PAGE_HEADER_BYTES: u64 = 32;
const P_VERSION: u64 = 0;
const P_MIN_VERSION: u64 = 8;
const P_PREV: u64 = 16;

/// Published handle of one column family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyMeta {
  pub blob: BlobId,
  /// Page directory (paged) or flat region (fixed)
  pub base: ArenaOffset,
  pub num_pages: u64,
  pub max_rows: u64,
  pub rows_per_page: u64,
  pub updatable: bool,
}

/// Byte geometry shared by pages and the flat region
#[derive(Debug, Clone, Copy)]
struct Geometry {
  rows: u64,
  columns: u64,
  header_bytes: u64,
  bitmap_bytes: u64,
  row_bytes: u64,
}

impl Geometry {
  fn new(layout: &FamilyLayout, max_rows: u64) -> Self {
    let (rows, header_bytes) = if layout.updatable {
      (layout.rows_per_page, PAGE_HEADER_BYTES)
    } else {
      (max_rows, 0)
    };
    let columns = layout.columns.len() as u64;
    Self {
      rows,
      columns,
      header_bytes,
      bitmap_bytes: (rows * columns).div_ceil(64) * WORD_BYTES,
      row_bytes: layout.row_bytes,
    }
  }

  fn words(&self) -> u64 {
    (self.header_bytes + self.bitmap_bytes + self.rows * self.row_bytes).div_ceil(WORD_BYTES)
  }

  #[inline]
  fn bit(&self, base: ArenaOffset, index: u64, column: u64) -> (ArenaOffset, u8) {
    let bit = index * self.columns + column;
    (base + self.header_bytes + bit / 8, 1u8 << (bit % 8))
  }

  #[inline]
  fn cell(&self, base: ArenaOffset, index: u64, column_offset: u64) -> ArenaOffset {
    base + self.header_bytes + self.bitmap_bytes + index * self.row_bytes + column_offset
  }
}

// ============================================================================
// Read side
// ============================================================================

#[derive(Debug, Clone)]
struct FamilyView {
  arena: Arc<SharedArena>,
  layout: FamilyLayout,
  meta: FamilyMeta,
  geometry: Geometry,
}

impl FamilyView {
  fn new(arena: Arc<SharedArena>, layout: FamilyLayout, meta: FamilyMeta) -> Self {
    let geometry = Geometry::new(&layout, meta.max_rows);
    Self {
      arena,
      layout,
      meta,
      geometry,
    }
  }

  #[inline]
  fn page_slot(&self, page: u64) -> ArenaOffset {
    self.meta.base + page * WORD_BYTES
  }

  /// Newest page version (or the flat region) and row index for `offset`
  fn head(&self, offset: u64) -> Option<(ArenaOffset, u64)> {
    if offset >= self.meta.max_rows {
      return None;
    }
    if !self.layout.updatable {
      return Some((self.meta.base, offset));
    }
    let page = offset / self.geometry.rows;
    let head = self.arena.load(self.page_slot(page));
    (head != 0).then_some((head, offset % self.geometry.rows))
  }

  /// Page version visible at `version`
  fn locate(&self, offset: u64, version: Epoch) -> Option<(ArenaOffset, u64)> {
    let (head, index) = self.head(offset)?;
    if !self.layout.updatable {
      return Some((head, index));
    }
    if self.arena.load(head + P_MIN_VERSION) > version {
      return None;
    }
    let mut page = head;
    while page != 0 {
      if self.arena.load(page + P_VERSION) <= version {
        return Some((page, index));
      }
      page = self.arena.load(page + P_PREV);
    }
    panic!("page chain for row {offset} ends above min_version");
  }

  fn is_set(&self, base: ArenaOffset, index: u64, column: u64) -> bool {
    let (at, mask) = self.geometry.bit(base, index, column);
    let mut byte = [0u8; 1];
    self.arena.read_bytes(at, &mut byte);
    byte[0] & mask != 0
  }

  fn row_in_use(&self, base: ArenaOffset, index: u64) -> bool {
    (0..self.geometry.columns).any(|column| self.is_set(base, index, column))
  }

  fn read(
    &self,
    base: ArenaOffset,
    index: u64,
    column: usize,
    strings: &StringBufferView,
  ) -> Option<PropValue> {
    if !self.is_set(base, index, column as u64) {
      return None;
    }
    let col = &self.layout.columns[column];
    let mut cell = [0u8; 8];
    let cell = &mut cell[..col.dtype.width()];
    self
      .arena
      .read_bytes(self.geometry.cell(base, index, col.offset), cell);
    if col.dtype == crate::types::DataType::String && read_surrogate(cell) & 0xFFFF == 0 {
      return None;
    }
    decode_cell(col.dtype, cell, |s| strings.get(s))
  }

  fn version_count(&self, offset: u64) -> usize {
    let Some((head, _)) = self.head(offset) else {
      return 0;
    };
    if !self.layout.updatable {
      return 1;
    }
    let mut count = 0;
    let mut page = head;
    while page != 0 {
      count += 1;
      page = self.arena.load(page + P_PREV);
    }
    count
  }
}

/// Read-only view over all column families of a label
#[derive(Debug, Clone)]
pub struct PagedPropertyView {
  layout: PropertyLayout,
  families: Vec<FamilyView>,
}

impl PagedPropertyView {
  pub fn attach(store: &dyn BlobStore, layout: PropertyLayout, metas: &[FamilyMeta]) -> Result<Self> {
    if metas.len() != layout.families.len() {
      return Err(GraphError::Schema(format!(
        "{} column family handles for {} families",
        metas.len(),
        layout.families.len()
      )));
    }
    let families = layout
      .families
      .iter()
      .zip(metas)
      .map(|(family, meta)| {
        if family.updatable != meta.updatable || family.rows_per_page != meta.rows_per_page {
          return Err(GraphError::Schema(format!(
            "column family handle {} does not match the schema layout",
            meta.blob
          )));
        }
        let arena = store.attach(meta.blob).ok_or(GraphError::BlobNotFound(meta.blob))?;
        Ok(FamilyView::new(arena, family.clone(), meta.clone()))
      })
      .collect::<Result<Vec<_>>>()?;
    Ok(Self { layout, families })
  }

  pub fn layout(&self) -> &PropertyLayout {
    &self.layout
  }

  /// Value of `prop` for row `offset` as of `version`
  pub fn get(
    &self,
    offset: u64,
    prop: PropId,
    version: Epoch,
    strings: &StringBufferView,
  ) -> Option<PropValue> {
    let slot = self.layout.slots.get(prop as usize)?;
    let family = &self.families[slot.family];
    let (base, index) = family.locate(offset, version)?;
    family.read(base, index, slot.column, strings)
  }

  /// Values of `prop` for the rows in `rows`, as of `version`
  pub fn scan<'a>(
    &'a self,
    prop: PropId,
    rows: std::ops::Range<u64>,
    version: Epoch,
    strings: &'a StringBufferView,
  ) -> impl Iterator<Item = (u64, Option<PropValue>)> + 'a {
    rows.map(move |offset| (offset, self.get(offset, prop, version, strings)))
  }

  /// Length of the version chain of the page holding `offset` in `family`
  pub fn page_version_count(&self, offset: u64, family: usize) -> usize {
    self.families[family].version_count(offset)
  }
}

// ============================================================================
// Write side
// ============================================================================

#[derive(Debug)]
struct ColumnFamily {
  blocks: BlockManager,
  view: FamilyView,
  page_order: u32,
}

impl ColumnFamily {
  fn new(
    store: &dyn BlobStore,
    layout: FamilyLayout,
    max_rows: u64,
    config: &StoreConfig,
  ) -> Result<Self> {
    let geometry = Geometry::new(&layout, max_rows);
    let region_order = BlockManager::order_for(geometry.words() * WORD_BYTES);
    let blocks = if layout.updatable {
      BlockManager::new(store, "property pages", config.property_arena_capacity, config.large_block_order)?
    } else {
      let capacity = ARENA_RESERVED_BYTES + (1u64 << region_order);
      BlockManager::new(store, "fixed properties", capacity, config.large_block_order)?
    };
    let (base, num_pages, page_order) = if layout.updatable {
      let num_pages = max_rows.div_ceil(geometry.rows);
      let directory = blocks.alloc(BlockManager::order_for(num_pages.max(1) * WORD_BYTES))?;
      blocks.arena().zero_words(directory, num_pages);
      (directory, num_pages, region_order)
    } else {
      (blocks.alloc(region_order)?, 0, region_order)
    };
    let meta = FamilyMeta {
      blob: blocks.blob(),
      base,
      num_pages,
      max_rows,
      rows_per_page: layout.rows_per_page,
      updatable: layout.updatable,
    };
    let view = FamilyView::new(Arc::clone(blocks.arena()), layout, meta);
    Ok(Self {
      blocks,
      view,
      page_order,
    })
  }

  fn arena(&self) -> &SharedArena {
    self.blocks.arena()
  }

  fn new_page(&self, version: Epoch, prev: ArenaOffset) -> Result<ArenaOffset> {
    let page = self.blocks.alloc(self.page_order)?;
    let words = self.view.geometry.words();
    let arena = self.arena();
    if prev == 0 {
      arena.zero_words(page, words);
      arena.store_relaxed(page + P_MIN_VERSION, version);
    } else {
      arena.copy_words(prev, page, words);
      let min_version = arena.load(prev + P_MIN_VERSION);
      arena.store_relaxed(page + P_MIN_VERSION, min_version);
    }
    arena.store_relaxed(page + P_PREV, prev);
    arena.store(page + P_VERSION, version);
    Ok(page)
  }

  /// Page (or flat region) to write row `offset` at `version`, copying the
  /// current page when `copy` is set and it belongs to an older epoch
  fn writable(&self, offset: u64, version: Epoch, copy: bool) -> Result<(ArenaOffset, u64)> {
    let view = &self.view;
    if offset >= view.meta.max_rows {
      return Err(GraphError::OutOfCapacity {
        what: "property rows",
        requested: offset + 1,
        capacity: view.meta.max_rows,
      });
    }
    if !view.layout.updatable {
      return Ok((view.meta.base, offset));
    }
    let page_no = offset / view.geometry.rows;
    let index = offset % view.geometry.rows;
    let slot = view.page_slot(page_no);
    let head = self.arena().load(slot);
    if head == 0 {
      let page = self.new_page(version, 0)?;
      self.arena().store(slot, page);
      return Ok((page, index));
    }
    let head_version = self.arena().load(head + P_VERSION);
    assert!(
      head_version <= version,
      "write at epoch {version} below page version {head_version}"
    );
    if !copy || head_version == version {
      return Ok((head, index));
    }
    let page = self.new_page(version, head)?;
    self.arena().store(slot, page);
    debug!(page = page_no, version, "property page copied on write");
    Ok((page, index))
  }

  fn write_row(&self, base: ArenaOffset, index: u64, cells: &[(Option<PropValue>, u64)]) {
    let view = &self.view;
    let arena = self.arena();
    for (column, (value, surrogate)) in cells.iter().enumerate() {
      let col = &view.layout.columns[column];
      let (bit_at, mask) = view.geometry.bit(base, index, column as u64);
      let mut byte = [0u8; 1];
      arena.read_bytes(bit_at, &mut byte);
      match value {
        Some(value) if !(matches!(value, PropValue::String(_)) && *surrogate == 0) => {
          let mut cell = [0u8; 8];
          let cell = &mut cell[..col.dtype.width()];
          encode_cell(value, *surrogate, cell);
          arena.write_bytes(view.geometry.cell(base, index, col.offset), cell);
          byte[0] |= mask;
        }
        _ => byte[0] &= !mask,
      }
      arena.write_bytes(bit_at, &byte);
    }
  }

  fn gc(&self, frontier: Epoch) -> usize {
    if !self.view.layout.updatable {
      return 0;
    }
    let arena = self.arena();
    let mut freed = 0;
    for page_no in 0..self.view.meta.num_pages {
      let head = arena.load(self.view.page_slot(page_no));
      if head == 0 {
        continue;
      }
      let mut newer = Vec::new();
      let mut page = head;
      while page != 0 && arena.load(page + P_VERSION) > frontier {
        newer.push(page);
        page = arena.load(page + P_PREV);
      }
      if page == 0 {
        continue;
      }
      let keep = page;
      let mut stale = arena.load(keep + P_PREV);
      if stale == 0 {
        continue;
      }
      let keep_version = arena.load(keep + P_VERSION);
      for &p in newer.iter().chain(std::iter::once(&keep)) {
        arena.store(p + P_MIN_VERSION, keep_version);
      }
      arena.store(keep + P_PREV, 0);
      while stale != 0 {
        let prev = arena.load(stale + P_PREV);
        self.blocks.free(stale, self.page_order);
        freed += 1;
        stale = prev;
      }
    }
    freed
  }
}

/// Writer for all column families of one vertex label
#[derive(Debug)]
pub struct PagedPropertyStore {
  label: LabelId,
  layout: PropertyLayout,
  families: Vec<ColumnFamily>,
}

impl PagedPropertyStore {
  pub fn new(
    store: &dyn BlobStore,
    label: LabelId,
    layout: PropertyLayout,
    config: &StoreConfig,
  ) -> Result<Self> {
    let families = layout
      .families
      .iter()
      .map(|family| ColumnFamily::new(store, family.clone(), config.max_vertices_per_label, config))
      .collect::<Result<Vec<_>>>()?;
    Ok(Self {
      label,
      layout,
      families,
    })
  }

  pub fn layout(&self) -> &PropertyLayout {
    &self.layout
  }

  pub fn meta(&self) -> Vec<FamilyMeta> {
    self.families.iter().map(|f| f.view.meta.clone()).collect()
  }

  pub fn view(&self) -> PagedPropertyView {
    PagedPropertyView {
      layout: self.layout.clone(),
      families: self.families.iter().map(|f| f.view.clone()).collect(),
    }
  }

  fn check_arity(&self, values: &[Option<PropValue>]) -> Result<()> {
    if values.len() != self.layout.prop_num() {
      return Err(GraphError::malformed(format!(
        "label {} expects {} properties, got {}",
        self.label,
        self.layout.prop_num(),
        values.len()
      )));
    }
    Ok(())
  }

  fn family_cells(
    &self,
    family: usize,
    values: &[Option<PropValue>],
    strings: &StringBuffer,
  ) -> Result<Vec<(Option<PropValue>, u64)>> {
    self.families[family]
      .view
      .layout
      .columns
      .iter()
      .map(|col| {
        let value = values[col.prop as usize].clone();
        let surrogate = match &value {
          Some(PropValue::String(s)) => strings.append(s)?,
          _ => 0,
        };
        Ok((value, surrogate))
      })
      .collect()
  }

  /// Write the first version of row `offset`
  pub fn insert(
    &self,
    offset: u64,
    values: &[Option<PropValue>],
    strings: &StringBuffer,
    version: Epoch,
  ) -> Result<()> {
    self.check_arity(values)?;
    // Every cell is built before any family is written
    let cells = (0..self.families.len())
      .map(|index| self.family_cells(index, values, strings))
      .collect::<Result<Vec<_>>>()?;
    for (family, cells) in self.families.iter().zip(cells) {
      // A row reused after deletion must not overwrite what older epochs see
      let reused = family
        .view
        .head(offset)
        .is_some_and(|(base, row)| family.view.row_in_use(base, row));
      let (base, row) = family.writable(offset, version, reused)?;
      family.write_row(base, row, &cells);
    }
    Ok(())
  }

  /// Write changed families of row `offset` as a new version. Returns the
  /// number of families that changed.
  pub fn update(
    &self,
    offset: u64,
    values: &[Option<PropValue>],
    strings: &StringBuffer,
    version: Epoch,
  ) -> Result<usize> {
    self.check_arity(values)?;
    let current = strings.view();
    let changed: Vec<usize> = (0..self.families.len())
      .filter(|&index| {
        let family = &self.families[index];
        let head = family.view.head(offset);
        family.view.layout.columns.iter().enumerate().any(|(column, col)| {
          let old = head.and_then(|(base, row)| family.view.read(base, row, column, &current));
          let new = match &values[col.prop as usize] {
            Some(PropValue::String(s)) if s.is_empty() => None,
            other => other.clone(),
          };
          old != new
        })
      })
      .collect();

    if let Some(&fixed) = changed.iter().find(|&&i| !self.families[i].view.layout.updatable) {
      return Err(GraphError::malformed(format!(
        "label {} family {fixed} is not updatable",
        self.label
      )));
    }
    let cells = changed
      .iter()
      .map(|&index| self.family_cells(index, values, strings))
      .collect::<Result<Vec<_>>>()?;
    for (&index, cells) in changed.iter().zip(cells) {
      let family = &self.families[index];
      let (base, row) = family.writable(offset, version, true)?;
      family.write_row(base, row, &cells);
    }
    Ok(changed.len())
  }

  /// Drop page versions no reader at `frontier` or later can reach
  pub fn gc(&self, frontier: Epoch) -> usize {
    self.families.iter().map(|f| f.gc(frontier)).sum()
  }

  pub fn page_version_count(&self, offset: u64, family: usize) -> usize {
    self.families[family].view.version_count(offset)
  }
}
