//! Point-in-time fragment reader
//!
//! A `Fragment` attaches every blob named by one published `EpochMetadata`
//! and answers reads as of that epoch: vertex iteration, adjacency,
//! properties and id translation. It never writes shared state, so any
//! number of fragments (at any published epochs) can be open while the
//! writer keeps appending.
//!
//! Vertices are local ids. Inner vertices keep their offset; mirrors of
//! foreign vertices use the mirrored offset `max_offset - ov`, so one
//! comparison against the vertex table capacity tells them apart.

mod iter;

#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

use crate::config::StoreConfig;
use crate::core::arena::{BlobStore, WordArray};
use crate::core::hashmap::MapView;
use crate::core::string_buffer::StringBufferView;
use crate::core::vertex_table::VertexTableView;
use crate::error::{GraphError, Result};
use crate::meta::{blob_key, latest_epoch, schema_key, EpochMetadata, LabelBlobs, MetaStore};
use crate::property::PagedPropertyView;
use crate::schema::{GraphSchema, SchemaLayout};
use crate::seggraph::SegGraphView;
use crate::types::{Direction, Epoch, FromPropValue, Gid, LabelId, PropId, PropValue, Vertex};
use crate::util::id_parser::IdParser;

pub use iter::{AdjIter, EdgeRef, VertexIter};

/// Read operations analytics run against one epoch of one partition
pub trait GraphView {
  fn fid(&self) -> u64;
  fn fnum(&self) -> u64;
  /// Epoch every read is bound to
  fn epoch(&self) -> Epoch;
  fn vertex_label_num(&self) -> usize;
  fn edge_label_num(&self) -> usize;

  /// Live inner and outer vertices of `label`
  fn vertices(&self, label: LabelId) -> VertexIter<'_>;
  fn inner_vertices(&self, label: LabelId) -> VertexIter<'_>;
  fn outer_vertices(&self, label: LabelId) -> VertexIter<'_>;
  fn inner_vertex_num(&self, label: LabelId) -> u64;
  fn outer_vertex_num(&self, label: LabelId) -> u64;
  fn edge_num(&self) -> u64;

  fn outgoing(&self, v: Vertex, edge_label: LabelId) -> AdjIter<'_>;
  fn incoming(&self, v: Vertex, edge_label: LabelId) -> AdjIter<'_>;

  fn is_inner(&self, v: Vertex) -> bool;
  fn is_outer(&self, v: Vertex) -> bool;
  fn vertex_label(&self, v: Vertex) -> LabelId;

  /// Global id for an external id, if it was live at this epoch
  fn oid2gid(&self, label: LabelId, oid: i64) -> Option<Gid>;
  fn gid2oid(&self, gid: Gid) -> Option<i64>;
  fn gid2vertex(&self, gid: Gid) -> Option<Vertex>;
  fn vertex2gid(&self, v: Vertex) -> Gid;

  /// Property of an inner vertex live at this epoch; `None` when null,
  /// unknown, deleted or a mirror
  fn get_value(&self, v: Vertex, prop: PropId) -> Option<PropValue>;

  fn get_data<T: FromPropValue>(&self, v: Vertex, prop: PropId) -> Option<T>
  where
    Self: Sized,
  {
    self.get_value(v, prop).and_then(T::from_prop_value)
  }
}

/// Attached views of one vertex label
#[derive(Debug)]
struct LabelView {
  vtable: VertexTableView,
  inner: SegGraphView,
  outer: SegGraphView,
  props: PagedPropertyView,
  ovg2l: MapView,
  ovl2g: WordArray,
  vertex_map: MapView,
  inner_oids: MapView,
  outer_oids: WordArray,
  inner_vertex_num: u64,
  outer_vertex_num: u64,
}

impl LabelView {
  fn attach(
    store: &dyn BlobStore,
    blobs: &LabelBlobs,
    schema: &SchemaLayout,
    label: LabelId,
  ) -> Result<Self> {
    let props = schema
      .vertex_labels
      .get(label as usize)
      .ok_or_else(|| GraphError::Schema(format!("metadata names unknown vertex label {label}")))?
      .props
      .clone();
    Ok(Self {
      vtable: VertexTableView::attach(store, blobs.vertex_table)?,
      inner: SegGraphView::attach(store, blobs.inner_edges.clone())?,
      outer: SegGraphView::attach(store, blobs.outer_edges.clone())?,
      props: PagedPropertyView::attach(store, props, &blobs.properties)?,
      ovg2l: MapView::attach(store, blobs.ovg2l)?,
      ovl2g: WordArray::attach(store, blobs.ovl2g.blob, blobs.ovl2g.len)?,
      vertex_map: MapView::attach(store, blobs.vertex_map)?,
      inner_oids: MapView::attach(store, blobs.inner_oids)?,
      outer_oids: WordArray::attach(store, blobs.outer_oids.blob, blobs.outer_oids.len)?,
      inner_vertex_num: blobs.inner_vertex_num,
      outer_vertex_num: blobs.outer_vertex_num,
    })
  }

  /// Offsets below this are inner
  #[inline]
  fn boundary(&self) -> u64 {
    self.vtable.meta().capacity
  }
}

/// One partition frozen at one published epoch
#[derive(Debug)]
pub struct Fragment {
  meta: EpochMetadata,
  schema: SchemaLayout,
  parser: IdParser,
  strings: StringBufferView,
  labels: Vec<LabelView>,
}

impl Fragment {
  /// Attach every blob `meta` names
  pub fn from_metadata(
    meta: EpochMetadata,
    schema: SchemaLayout,
    blobs: &dyn BlobStore,
  ) -> Result<Self> {
    if meta.vertex_label_num != schema.vertex_label_num()
      || meta.edge_label_num != schema.edge_label_num()
    {
      return Err(GraphError::Schema(format!(
        "metadata has {}/{} labels, schema {}/{}",
        meta.vertex_label_num,
        meta.edge_label_num,
        schema.vertex_label_num(),
        schema.edge_label_num()
      )));
    }
    let labels = meta
      .labels
      .iter()
      .enumerate()
      .map(|(label, blobs_of)| LabelView::attach(blobs, blobs_of, &schema, label as LabelId))
      .collect::<Result<Vec<_>>>()?;
    let parser = IdParser::new(meta.fnum, meta.vertex_label_num);
    let strings = StringBufferView::attach(blobs, meta.string_buffer)?;
    Ok(Self {
      meta,
      schema,
      parser,
      strings,
      labels,
    })
  }

  /// Open partition `fid` at `epoch`, or at its latest finalized epoch
  pub fn open(
    meta_store: &dyn MetaStore,
    blobs: &dyn BlobStore,
    config: &StoreConfig,
    fid: u64,
    epoch: Option<Epoch>,
  ) -> Result<Self> {
    let prefix = &config.meta_prefix;
    let epoch = match epoch {
      Some(epoch) => epoch,
      None => latest_epoch(meta_store, prefix, fid)?.ok_or_else(|| {
        GraphError::MetadataNotFound(format!("no finalized epoch for partition {fid}"))
      })?,
    };
    let key = blob_key(prefix, config.machine_id, fid, epoch);
    let doc = meta_store
      .get(&key)?
      .ok_or_else(|| GraphError::MetadataNotFound(key.clone()))?;
    let key = schema_key(prefix, fid);
    let schema = meta_store
      .get(&key)?
      .ok_or_else(|| GraphError::MetadataNotFound(key.clone()))?;
    let schema = GraphSchema::from_json_str(&schema)?.resolve(config)?;
    Self::from_metadata(EpochMetadata::from_json_str(&doc)?, schema, blobs)
  }

  pub fn metadata(&self) -> &EpochMetadata {
    &self.meta
  }

  pub fn schema(&self) -> &SchemaLayout {
    &self.schema
  }

  pub fn id_parser(&self) -> &IdParser {
    &self.parser
  }

  fn label(&self, label: LabelId) -> &LabelView {
    &self.labels[label as usize]
  }

  fn adjacency(&self, v: Vertex, edge_label: LabelId, dir: Direction) -> AdjIter<'_> {
    let label = self.parser.get_label_id(v.lid());
    let offset = self.parser.get_offset(v.lid());
    let view = self.label(label);
    let entries = if offset < view.boundary() {
      view.inner.reader(self.meta.epoch).edges(offset, edge_label, dir)
    } else {
      let ov = self.parser.mirror_offset(offset);
      view.outer.reader(self.meta.epoch).edges(ov, edge_label, dir)
    };
    AdjIter::new(
      entries,
      &self.schema.edge_labels[edge_label as usize].props,
      &self.strings,
    )
  }

  /// Recount live edges by walking every OUT list
  pub fn count_edges(&self) -> u64 {
    let labels = 0..self.labels.len() as LabelId;
    let per_label = |label: LabelId| -> u64 {
      self
        .vertices(label)
        .map(|v| {
          (0..self.meta.edge_label_num as LabelId)
            .map(|e| self.outgoing(v, e).count() as u64)
            .sum::<u64>()
        })
        .sum()
    };
    #[cfg(not(target_arch = "wasm32"))]
    {
      labels.into_par_iter().map(per_label).sum()
    }
    #[cfg(target_arch = "wasm32")]
    {
      labels.map(per_label).sum()
    }
  }

  /// Epochs at which the adjacency list of `v` changed
  pub fn checkpoint_epochs(&self, v: Vertex, edge_label: LabelId, dir: Direction) -> Vec<Epoch> {
    let label = self.parser.get_label_id(v.lid());
    let offset = self.parser.get_offset(v.lid());
    let view = self.label(label);
    if offset < view.boundary() {
      view.inner.checkpoint_epochs(offset, edge_label, dir)
    } else {
      view
        .outer
        .checkpoint_epochs(self.parser.mirror_offset(offset), edge_label, dir)
    }
  }

  pub(crate) fn vertex_table(&self, label: LabelId) -> &VertexTableView {
    &self.label(label).vtable
  }
}

impl GraphView for Fragment {
  fn fid(&self) -> u64 {
    self.meta.fid
  }

  fn fnum(&self) -> u64 {
    self.meta.fnum
  }

  fn epoch(&self) -> Epoch {
    self.meta.epoch
  }

  fn vertex_label_num(&self) -> usize {
    self.meta.vertex_label_num
  }

  fn edge_label_num(&self) -> usize {
    self.meta.edge_label_num
  }

  fn vertices(&self, label: LabelId) -> VertexIter<'_> {
    let view = self.label(label);
    VertexIter::new(
      &self.parser,
      label,
      Some(view.vtable.inner()),
      Some(view.vtable.outer()),
    )
  }

  fn inner_vertices(&self, label: LabelId) -> VertexIter<'_> {
    VertexIter::new(&self.parser, label, Some(self.label(label).vtable.inner()), None)
  }

  fn outer_vertices(&self, label: LabelId) -> VertexIter<'_> {
    VertexIter::new(&self.parser, label, None, Some(self.label(label).vtable.outer()))
  }

  fn inner_vertex_num(&self, label: LabelId) -> u64 {
    self.label(label).inner_vertex_num
  }

  fn outer_vertex_num(&self, label: LabelId) -> u64 {
    self.label(label).outer_vertex_num
  }

  fn edge_num(&self) -> u64 {
    self.meta.total_edge_num
  }

  fn outgoing(&self, v: Vertex, edge_label: LabelId) -> AdjIter<'_> {
    self.adjacency(v, edge_label, Direction::Out)
  }

  fn incoming(&self, v: Vertex, edge_label: LabelId) -> AdjIter<'_> {
    self.adjacency(v, edge_label, Direction::In)
  }

  fn is_inner(&self, v: Vertex) -> bool {
    let view = self.label(self.parser.get_label_id(v.lid()));
    self.parser.get_offset(v.lid()) < view.boundary()
  }

  fn is_outer(&self, v: Vertex) -> bool {
    !self.is_inner(v)
  }

  fn vertex_label(&self, v: Vertex) -> LabelId {
    self.parser.get_label_id(v.lid())
  }

  fn oid2gid(&self, label: LabelId, oid: i64) -> Option<Gid> {
    self
      .labels
      .get(label as usize)?
      .vertex_map
      .get(oid as u64, self.meta.epoch)
  }

  fn gid2oid(&self, gid: Gid) -> Option<i64> {
    let label = self.parser.get_label_id(gid);
    let view = self.labels.get(label as usize)?;
    let oid = if self.parser.get_fid(gid) == self.meta.fid {
      view.inner_oids.get(self.parser.get_offset(gid), self.meta.epoch)? as i64
    } else {
      let ov = view.ovg2l.get(gid, self.meta.epoch)?;
      view.outer_oids.get(ov) as i64
    };
    // An external id may have moved to another vertex since
    (view.vertex_map.get(oid as u64, self.meta.epoch) == Some(gid)).then_some(oid)
  }

  fn gid2vertex(&self, gid: Gid) -> Option<Vertex> {
    self.gid2oid(gid)?;
    let label = self.parser.get_label_id(gid);
    let offset = if self.parser.get_fid(gid) == self.meta.fid {
      self.parser.get_offset(gid)
    } else {
      let ov = self.label(label).ovg2l.get(gid, self.meta.epoch)?;
      self.parser.mirror_offset(ov)
    };
    Some(Vertex(self.parser.generate_lid(label, offset)))
  }

  fn vertex2gid(&self, v: Vertex) -> Gid {
    let label = self.parser.get_label_id(v.lid());
    let offset = self.parser.get_offset(v.lid());
    let view = self.label(label);
    if offset < view.boundary() {
      self.parser.lid_to_gid(v.lid(), self.meta.fid)
    } else {
      view.ovl2g.get(self.parser.mirror_offset(offset))
    }
  }

  fn get_value(&self, v: Vertex, prop: PropId) -> Option<PropValue> {
    let label = self.parser.get_label_id(v.lid());
    let offset = self.parser.get_offset(v.lid());
    let view = self.labels.get(label as usize)?;
    // Live inner vertices only; rows of deleted vertices stay in the pages
    view.inner_oids.get(offset, self.meta.epoch)?;
    view.props.get(offset, prop, self.meta.epoch, &self.strings)
  }
}
