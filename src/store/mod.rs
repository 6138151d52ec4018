//! Graph store orchestrator
//!
//! One `GraphStore` owns every writer-side structure of one partition and
//! applies mutation records to them in log order. Epochs advance as a small
//! state machine:
//!
//! ```text
//! Idle --record(N)--> Applying(N) --record(M > N)--> finalize(N), Applying(M)
//!                          |
//!                          `--bulkload_end(M)--> finalize(N), Idle (floor M)
//! ```
//!
//! Finalizing an epoch snapshots the frontiers and blob handles of every
//! structure into an `EpochMetadata` document and publishes it, then moves
//! the latest-epoch pointer. Readers only ever open published documents.
//!
//! The store takes `&mut self` for every mutation. A single apply thread per
//! partition is the barrier between epochs: every record of epoch N has been
//! applied before the first record of N + 1 is looked at.

pub mod record;
pub mod runner;

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::config::StoreConfig;
use crate::constants::NO_EPOCH_PUBLISHED;
use crate::core::arena::{BlobStore, WordArray};
use crate::core::hashmap::VersionedMap;
use crate::core::string_buffer::StringBuffer;
use crate::core::vertex_table::VertexTable;
use crate::error::{GraphError, Result};
use crate::meta::{blob_key, latest_epoch_key, schema_key, ArrayMeta, EpochMetadata, LabelBlobs, MetaStore};
use crate::property::PagedPropertyStore;
use crate::schema::{GraphSchema, SchemaLayout};
use crate::seggraph::SegGraph;
use crate::types::{Direction, Epoch, Gid, LabelId, Lid};
use crate::util::id_parser::IdParser;

pub use record::{EdgeRecord, MutationRecord, VertexRecord};
pub use runner::{LogRunner, RunnerPool, RunnerStats};

// ============================================================================
// Per-label state
// ============================================================================

/// Writer-side structures of one vertex label
#[derive(Debug)]
struct LabelStore {
  vtable: VertexTable,
  inner: SegGraph,
  outer: SegGraph,
  props: PagedPropertyStore,
  ovg2l: VersionedMap,
  ovl2g: WordArray,
  vertex_map: VersionedMap,
  inner_oids: VersionedMap,
  outer_oids: WordArray,
}

impl LabelStore {
  fn new(
    blobs: &Arc<dyn BlobStore>,
    config: &Arc<StoreConfig>,
    schema: &SchemaLayout,
    label: LabelId,
  ) -> Result<Self> {
    let store = blobs.as_ref();
    let capacity = config.max_vertices_per_label;
    let edge_props = schema.edge_prop_bytes();
    Ok(Self {
      vtable: VertexTable::new(store, label, capacity)?,
      inner: SegGraph::new(store, "inner edges", Arc::clone(config), edge_props.clone())?,
      outer: SegGraph::new(store, "outer edges", Arc::clone(config), edge_props)?,
      props: PagedPropertyStore::new(
        store,
        label,
        schema.vertex_labels[label as usize].props.clone(),
        config,
      )?,
      ovg2l: VersionedMap::new(Arc::clone(blobs), "ovg2l", config.hashmap_initial_capacity)?,
      ovl2g: WordArray::allocate(store, capacity)?,
      vertex_map: VersionedMap::new(
        Arc::clone(blobs),
        "vertex map",
        config.hashmap_initial_capacity,
      )?,
      inner_oids: VersionedMap::new(
        Arc::clone(blobs),
        "inner oids",
        config.hashmap_initial_capacity,
      )?,
      outer_oids: WordArray::allocate(store, capacity)?,
    })
  }

  fn graph(&self, side: Side) -> &SegGraph {
    match side {
      Side::Inner(_) => &self.inner,
      Side::Outer(_) => &self.outer,
    }
  }

  fn blobs(&self) -> LabelBlobs {
    let array = |a: &WordArray| ArrayMeta {
      blob: a.blob(),
      len: a.len(),
    };
    LabelBlobs {
      vertex_table: self.vtable.meta(),
      inner_edges: self.inner.meta(),
      outer_edges: self.outer.meta(),
      ovl2g: array(&self.ovl2g),
      ovg2l: self.ovg2l.meta(),
      vertex_map: self.vertex_map.meta(),
      inner_oids: self.inner_oids.meta(),
      outer_oids: array(&self.outer_oids),
      properties: self.props.meta(),
      inner_vertex_num: self.vtable.inner_live_count(),
      outer_vertex_num: self.vtable.outer_live_count(),
    }
  }
}

/// Where a vertex's adjacency lives in this partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
  /// Owned vertex, by offset
  Inner(u64),
  /// Mirror of a foreign vertex, by mirror index
  Outer(u64),
}

impl Side {
  fn index(self) -> u64 {
    match self {
      Side::Inner(offset) | Side::Outer(offset) => offset,
    }
  }
}

/// Local endpoint of an edge: label, adjacency side and local id
#[derive(Debug, Clone, Copy)]
struct Endpoint {
  label: LabelId,
  side: Side,
  lid: Lid,
}

// ============================================================================
// Store
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpochState {
  Idle,
  Applying(Epoch),
}

/// Counters of one store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
  pub applied: u64,
  pub skipped_foreign: u64,
  pub skipped_stale: u64,
  pub finalized_epochs: u64,
  pub vertex_num: u64,
  pub edge_num: u64,
  pub edge_blocks: u64,
  pub compactions: u64,
}

/// Writer for one partition
pub struct GraphStore {
  config: Arc<StoreConfig>,
  schema: SchemaLayout,
  parser: IdParser,
  fid: u64,
  fnum: u64,
  blobs: Arc<dyn BlobStore>,
  meta_store: Arc<dyn MetaStore>,
  strings: StringBuffer,
  labels: Vec<LabelStore>,
  state: EpochState,
  /// Records below this epoch are stale
  floor: Epoch,
  last_finalized: Option<Epoch>,
  last_log_offset: Option<u64>,
  edge_num: u64,
  stats: StoreStats,
}

impl std::fmt::Debug for GraphStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("GraphStore")
      .field("fid", &self.fid)
      .field("fnum", &self.fnum)
      .field("state", &self.state)
      .field("last_finalized", &self.last_finalized)
      .field("edge_num", &self.edge_num)
      .finish()
  }
}

impl GraphStore {
  /// Build the store for partition `fid` of `fnum`, publish the schema and
  /// reset the latest-epoch pointer
  pub fn new(
    config: Arc<StoreConfig>,
    schema: &GraphSchema,
    fid: u64,
    fnum: u64,
    blobs: Arc<dyn BlobStore>,
    meta_store: Arc<dyn MetaStore>,
  ) -> Result<Self> {
    config.validate()?;
    if fnum == 0 || fid >= fnum {
      return Err(GraphError::Config(format!("partition {fid} of {fnum}")));
    }
    let layout = schema.resolve(&config)?;
    let parser = IdParser::new(fnum, layout.vertex_label_num());
    if parser.max_offset() / 2 < config.max_vertices_per_label {
      return Err(GraphError::Config(format!(
        "{} vertices per label do not fit {} offset bits",
        config.max_vertices_per_label,
        parser.offset_width()
      )));
    }

    let strings = StringBuffer::new(blobs.as_ref(), config.string_buffer_capacity)?;
    let labels = (0..layout.vertex_label_num() as LabelId)
      .map(|label| LabelStore::new(&blobs, &config, &layout, label))
      .collect::<Result<Vec<_>>>()?;

    meta_store.put(&schema_key(&config.meta_prefix, fid), &schema.to_json()?)?;
    meta_store.put(
      &latest_epoch_key(&config.meta_prefix, fid),
      &NO_EPOCH_PUBLISHED.to_string(),
    )?;
    info!(
      fid,
      fnum,
      vertex_labels = layout.vertex_label_num(),
      edge_labels = layout.edge_label_num(),
      "graph store created"
    );

    Ok(Self {
      config,
      schema: layout,
      parser,
      fid,
      fnum,
      blobs,
      meta_store,
      strings,
      labels,
      state: EpochState::Idle,
      floor: 0,
      last_finalized: None,
      last_log_offset: None,
      edge_num: 0,
      stats: StoreStats::default(),
    })
  }

  pub fn fid(&self) -> u64 {
    self.fid
  }

  pub fn fnum(&self) -> u64 {
    self.fnum
  }

  pub fn config(&self) -> &Arc<StoreConfig> {
    &self.config
  }

  pub fn schema(&self) -> &SchemaLayout {
    &self.schema
  }

  pub fn id_parser(&self) -> &IdParser {
    &self.parser
  }

  pub fn blob_store(&self) -> &Arc<dyn BlobStore> {
    &self.blobs
  }

  pub fn meta_store(&self) -> &Arc<dyn MetaStore> {
    &self.meta_store
  }

  /// Epoch currently being applied
  pub fn current_epoch(&self) -> Option<Epoch> {
    match self.state {
      EpochState::Applying(epoch) => Some(epoch),
      EpochState::Idle => None,
    }
  }

  pub fn last_finalized(&self) -> Option<Epoch> {
    self.last_finalized
  }

  /// Log offset of the newest applied record that carried one
  pub fn last_log_offset(&self) -> Option<u64> {
    self.last_log_offset
  }

  pub fn stats(&self) -> StoreStats {
    let mut stats = self.stats.clone();
    stats.vertex_num = self
      .labels
      .iter()
      .map(|l| l.vtable.inner_live_count())
      .sum();
    stats.edge_num = self.edge_num;
    for label in &self.labels {
      for graph in [&label.inner, &label.outer] {
        let g = graph.stats();
        stats.edge_blocks += g.blocks;
        stats.compactions += g.compactions;
      }
    }
    stats
  }

  /// Rows of property family `family` share a version chain per page
  pub fn page_version_count(&self, label: LabelId, offset: u64, family: usize) -> usize {
    self.labels[label as usize].props.page_version_count(offset, family)
  }

  // ==========================================================================
  // Record dispatch
  // ==========================================================================

  /// Parse and apply one log line. Malformed lines are logged and skipped;
  /// returns whether the line was applied.
  pub fn apply_line(&mut self, line: &str) -> Result<bool> {
    let outcome = MutationRecord::parse(line, &self.schema, &self.parser)
      .and_then(|record| self.apply(record));
    match outcome {
      Ok(()) => Ok(true),
      Err(e) if e.is_recoverable() => {
        warn!(fid = self.fid, error = %e, line, "skipping malformed record");
        Ok(false)
      }
      Err(e) => Err(e),
    }
  }

  /// Apply one record, advancing the epoch state machine first
  pub fn apply(&mut self, record: MutationRecord) -> Result<()> {
    let epoch = record.epoch();
    if epoch < self.floor || matches!(self.state, EpochState::Applying(cur) if epoch < cur) {
      warn!(
        fid = self.fid,
        epoch,
        floor = self.floor,
        op = record.op(),
        "skipping stale record"
      );
      self.stats.skipped_stale += 1;
      return Ok(());
    }

    if let MutationRecord::BulkLoadEnd { epoch, log_offset } = record {
      self.finalize()?;
      self.floor = self.floor.max(epoch);
      self.last_log_offset = log_offset.or(self.last_log_offset);
      info!(fid = self.fid, next_epoch = epoch, "bulk load finished");
      return Ok(());
    }

    if let EpochState::Applying(cur) = self.state {
      if epoch > cur {
        self.finalize()?;
      }
    }
    self.state = EpochState::Applying(epoch);

    let log_offset = record.log_offset();
    match record {
      MutationRecord::AddVertex(v) => self.add_vertex(&v)?,
      MutationRecord::UpdateVertex(v) => self.update_vertex(&v)?,
      MutationRecord::DeleteVertex(v) => self.delete_vertex(&v)?,
      MutationRecord::AddEdge(e) => self.add_edge(&e)?,
      MutationRecord::UpdateEdge(e) => self.update_edge(&e)?,
      MutationRecord::DeleteEdge(e) => self.delete_edge(&e)?,
      MutationRecord::BulkLoadEnd { .. } => unreachable!("handled above"),
    }
    self.stats.applied += 1;
    if log_offset.is_some() {
      self.last_log_offset = log_offset;
    }
    Ok(())
  }

  fn is_local(&self, gid: Gid) -> bool {
    self.parser.get_fid(gid) == self.fid
  }

  fn skip_foreign(&mut self, op: &str, gid: Gid) {
    trace!(fid = self.fid, op, gid, "record for another partition");
    self.stats.skipped_foreign += 1;
  }

  fn check_label(&self, gid: Gid) -> Result<LabelId> {
    let label = self.parser.get_label_id(gid);
    if label as usize >= self.labels.len() {
      return Err(GraphError::malformed(format!("gid {gid} has unknown label {label}")));
    }
    Ok(label)
  }

  // ==========================================================================
  // Vertices
  // ==========================================================================

  fn add_vertex(&mut self, v: &VertexRecord) -> Result<()> {
    if !self.is_local(v.gid) {
      self.skip_foreign("add_vertex", v.gid);
      return Ok(());
    }
    let label = self.check_label(v.gid)?;
    let offset = self.parser.get_offset(v.gid);
    let store = &mut self.labels[label as usize];
    if store.vtable.is_inner_live(offset) {
      return Err(GraphError::malformed(format!("vertex {} added twice", v.gid)));
    }
    store.inner.create_graph_writer(v.epoch).ensure_vertex(offset)?;
    store.props.insert(offset, &v.props, &self.strings, v.epoch)?;
    store.vtable.add_inner(offset)?;
    store.vertex_map.insert(v.external_id as u64, v.gid, v.epoch)?;
    store.inner_oids.insert(offset, v.external_id as u64, v.epoch)?;
    Ok(())
  }

  fn update_vertex(&mut self, v: &VertexRecord) -> Result<()> {
    if !self.is_local(v.gid) {
      self.skip_foreign("update_vertex", v.gid);
      return Ok(());
    }
    let label = self.check_label(v.gid)?;
    let offset = self.parser.get_offset(v.gid);
    let store = &self.labels[label as usize];
    if !store.vtable.is_inner_live(offset) {
      return Err(GraphError::malformed(format!("update of missing vertex {}", v.gid)));
    }
    let changed = store.props.update(offset, &v.props, &self.strings, v.epoch)?;
    debug!(gid = v.gid, epoch = v.epoch, families = changed, "vertex updated");
    Ok(())
  }

  fn delete_vertex(&mut self, v: &VertexRecord) -> Result<()> {
    let label = self.check_label(v.gid)?;
    let (side, lid) = if self.is_local(v.gid) {
      let offset = self.parser.get_offset(v.gid);
      let store = &mut self.labels[label as usize];
      if !store.vtable.delete_inner(offset)? {
        return Err(GraphError::malformed(format!("delete of missing vertex {}", v.gid)));
      }
      store.inner_oids.remove(offset, v.epoch);
      (Side::Inner(offset), self.parser.generate_lid(label, offset))
    } else {
      let store = &mut self.labels[label as usize];
      let Some(ov) = store.ovg2l.get_latest(v.gid) else {
        self.skip_foreign("delete_vertex", v.gid);
        return Ok(());
      };
      store.vtable.delete_outer(ov)?;
      store.ovg2l.remove(v.gid, v.epoch);
      let mirror = self.parser.mirror_offset(ov);
      (Side::Outer(ov), self.parser.generate_lid(label, mirror))
    };
    self.labels[label as usize]
      .vertex_map
      .remove(v.external_id as u64, v.epoch);

    let me = Endpoint { label, side, lid };
    let mut removed = 0u64;
    for elabel in 0..self.schema.edge_label_num() as LabelId {
      let edge = &self.schema.edge_labels[elabel as usize];
      if edge.src_label == label {
        removed += self.cascade(me, elabel, Direction::Out, v.epoch)?;
      }
      if edge.dst_label == label {
        removed += self.cascade(me, elabel, Direction::In, v.epoch)?;
      }
    }
    self.edge_num -= removed;
    debug!(gid = v.gid, epoch = v.epoch, edges = removed, "vertex deleted");
    Ok(())
  }

  /// Tombstone every live edge of `me` in `dir` and its twin on the other
  /// endpoint. Returns the number of edges removed.
  fn cascade(&self, me: Endpoint, elabel: LabelId, dir: Direction, epoch: Epoch) -> Result<u64> {
    let graph = self.labels[me.label as usize].graph(me.side);
    let writer = graph.create_graph_writer(epoch);
    let neighbors: Vec<Lid> = writer
      .edges(me.side.index(), elabel, dir)
      .map(|e| e.neighbor())
      .collect();
    for &neighbor in &neighbors {
      writer.delete_edge(me.side.index(), elabel, dir, neighbor)?;
      let other = self.endpoint_of_lid(neighbor);
      let twin = self.labels[other.label as usize].graph(other.side);
      let cancelled = twin
        .create_graph_writer(epoch)
        .delete_edge(other.side.index(), elabel, dir.reverse(), me.lid)?;
      assert!(cancelled, "edge {} -> {neighbor} has no twin", me.lid);
    }
    Ok(neighbors.len() as u64)
  }

  fn endpoint_of_lid(&self, lid: Lid) -> Endpoint {
    let label = self.parser.get_label_id(lid);
    let offset = self.parser.get_offset(lid);
    let side = if offset < self.config.max_vertices_per_label {
      Side::Inner(offset)
    } else {
      Side::Outer(self.parser.mirror_offset(offset))
    };
    Endpoint { label, side, lid }
  }

  // ==========================================================================
  // Edges
  // ==========================================================================

  /// Resolve an edge endpoint, creating a mirror for a foreign vertex when
  /// `create` is set
  fn endpoint(&mut self, gid: Gid, oid: i64, epoch: Epoch, create: bool) -> Result<Option<Endpoint>> {
    let label = self.check_label(gid)?;
    if self.is_local(gid) {
      let offset = self.parser.get_offset(gid);
      debug_assert!(self.labels[label as usize].vtable.is_inner_live(offset));
      let lid = self.parser.generate_lid(label, offset);
      return Ok(Some(Endpoint {
        label,
        side: Side::Inner(offset),
        lid,
      }));
    }

    let ov = match self.labels[label as usize].ovg2l.get_latest(gid) {
      Some(ov) => ov,
      None if create => {
        let store = &mut self.labels[label as usize];
        let ov = store.vtable.add_outer()?;
        store.outer.create_graph_writer(epoch).ensure_vertex(ov)?;
        store.ovl2g.set(ov, gid);
        store.outer_oids.set(ov, oid as u64);
        store.ovg2l.insert(gid, ov, epoch)?;
        store.vertex_map.insert(oid as u64, gid, epoch)?;
        trace!(gid, ov, label, "mirror vertex created");
        ov
      }
      None => return Ok(None),
    };
    let lid = self.parser.generate_lid(label, self.parser.mirror_offset(ov));
    Ok(Some(Endpoint {
      label,
      side: Side::Outer(ov),
      lid,
    }))
  }

  /// Whether the edge concerns this partition. A missing local endpoint is
  /// an error. Runs before any mirror is created so a rejected record leaves
  /// nothing behind.
  fn check_endpoints(&self, e: &EdgeRecord) -> Result<bool> {
    if !self.is_local(e.src) && !self.is_local(e.dst) {
      return Ok(false);
    }
    for gid in [e.src, e.dst] {
      let label = self.check_label(gid)?;
      let offset = self.parser.get_offset(gid);
      if self.is_local(gid) && !self.labels[label as usize].vtable.is_inner_live(offset) {
        return Err(GraphError::malformed(format!("edge endpoint {gid} does not exist")));
      }
    }
    Ok(true)
  }

  /// Both endpoints of a checked edge; `None` when a foreign endpoint has no
  /// mirror and `create` is unset
  fn endpoints(&mut self, e: &EdgeRecord, create: bool) -> Result<Option<(Endpoint, Endpoint)>> {
    let src = self.endpoint(e.src, e.src_external_id, e.epoch, create)?;
    let dst = self.endpoint(e.dst, e.dst_external_id, e.epoch, create)?;
    Ok(src.zip(dst))
  }

  fn encode_props(&self, e: &EdgeRecord) -> Result<Vec<u8>> {
    self.schema.edge_labels[e.label as usize]
      .props
      .encode(&e.props, &self.strings)
  }

  fn put_pair(&self, src: Endpoint, dst: Endpoint, e: &EdgeRecord, bytes: &[u8]) -> Result<()> {
    self.labels[src.label as usize]
      .graph(src.side)
      .create_graph_writer(e.epoch)
      .put_edge(src.side.index(), e.label, Direction::Out, dst.lid, bytes)?;
    self.labels[dst.label as usize]
      .graph(dst.side)
      .create_graph_writer(e.epoch)
      .put_edge(dst.side.index(), e.label, Direction::In, src.lid, bytes)
  }

  /// Cancel the newest live (src, dst) edge on both lists
  fn remove_pair(&self, src: Endpoint, dst: Endpoint, e: &EdgeRecord) -> Result<bool> {
    let out = self.labels[src.label as usize]
      .graph(src.side)
      .create_graph_writer(e.epoch)
      .delete_edge(src.side.index(), e.label, Direction::Out, dst.lid)?;
    if !out {
      return Ok(false);
    }
    let inc = self.labels[dst.label as usize]
      .graph(dst.side)
      .create_graph_writer(e.epoch)
      .delete_edge(dst.side.index(), e.label, Direction::In, src.lid)?;
    assert!(inc, "edge {} -> {} has no incoming twin", src.lid, dst.lid);
    Ok(true)
  }

  fn add_edge(&mut self, e: &EdgeRecord) -> Result<()> {
    if !self.check_endpoints(e)? {
      self.skip_foreign("add_edge", e.src);
      return Ok(());
    }
    let bytes = self.encode_props(e)?;
    if let Some((src, dst)) = self.endpoints(e, true)? {
      self.put_pair(src, dst, e, &bytes)?;
      self.edge_num += 1;
    }
    Ok(())
  }

  fn delete_edge(&mut self, e: &EdgeRecord) -> Result<()> {
    if !self.check_endpoints(e)? {
      self.skip_foreign("delete_edge", e.src);
      return Ok(());
    }
    let Some((src, dst)) = self.endpoints(e, false)? else {
      self.skip_foreign("delete_edge", e.src);
      return Ok(());
    };
    if !self.remove_pair(src, dst, e)? {
      return Err(GraphError::malformed(format!(
        "no live edge {} -> {} with label {}",
        e.src, e.dst, e.label
      )));
    }
    self.edge_num -= 1;
    Ok(())
  }

  fn update_edge(&mut self, e: &EdgeRecord) -> Result<()> {
    if !self.check_endpoints(e)? {
      self.skip_foreign("update_edge", e.src);
      return Ok(());
    }
    let bytes = self.encode_props(e)?;
    let Some((src, dst)) = self.endpoints(e, true)? else {
      return Ok(());
    };
    if self.remove_pair(src, dst, e)? {
      self.edge_num -= 1;
    }
    self.put_pair(src, dst, e, &bytes)?;
    self.edge_num += 1;
    Ok(())
  }

  // ==========================================================================
  // Epochs
  // ==========================================================================

  /// Metadata describing the store as it stands, stamped with `epoch`
  pub fn metadata(&self, epoch: Epoch) -> EpochMetadata {
    let labels: Vec<LabelBlobs> = self.labels.iter().map(LabelStore::blobs).collect();
    let total_vertex_num = labels.iter().map(|l| l.inner_vertex_num).sum();
    EpochMetadata {
      ipc_socket: self.blobs.ipc_socket(),
      machine_id: self.config.machine_id,
      fid: self.fid,
      fnum: self.fnum,
      epoch,
      vertex_label_num: self.schema.vertex_label_num(),
      edge_label_num: self.schema.edge_label_num(),
      string_buffer: self.strings.blob(),
      labels,
      total_vertex_num,
      total_edge_num: self.edge_num,
    }
  }

  /// Publish the epoch being applied. Returns its metadata, or `None` when
  /// nothing was being applied.
  pub fn finalize(&mut self) -> Result<Option<EpochMetadata>> {
    let EpochState::Applying(epoch) = self.state else {
      return Ok(None);
    };
    let metadata = self.metadata(epoch);
    let prefix = &self.config.meta_prefix;
    self.meta_store.put(
      &blob_key(prefix, self.config.machine_id, self.fid, epoch),
      &metadata.to_json()?,
    )?;
    self
      .meta_store
      .put(&latest_epoch_key(prefix, self.fid), &epoch.to_string())?;

    self.state = EpochState::Idle;
    self.floor = epoch + 1;
    self.last_finalized = Some(epoch);
    self.stats.finalized_epochs += 1;
    info!(
      fid = self.fid,
      epoch,
      vertices = metadata.total_vertex_num,
      edges = metadata.total_edge_num,
      "epoch finalized"
    );
    Ok(Some(metadata))
  }

  /// Reclaim storage no reader at `frontier` or later can reach. Callers
  /// guarantee no reader is bound to an epoch below `frontier`.
  pub fn gc(&self, frontier: Epoch) -> GcStats {
    let mut stats = GcStats::default();
    for label in &self.labels {
      stats.pages_freed += label.props.gc(frontier);
      stats.blocks_recycled += label.inner.recycle_blocks(frontier);
      stats.blocks_recycled += label.outer.recycle_blocks(frontier);
    }
    debug!(
      fid = self.fid,
      frontier,
      pages = stats.pages_freed,
      blocks = stats.blocks_recycled,
      "garbage collected"
    );
    stats
  }
}

/// What one `gc` pass reclaimed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
  pub pages_freed: usize,
  pub blocks_recycled: usize,
}

#[cfg(test)]
mod tests;
