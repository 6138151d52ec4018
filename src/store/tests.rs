use std::sync::Arc;

use super::*;
use crate::core::arena::LocalBlobStore;
use crate::fragment::{Fragment, GraphView};
use crate::meta::{latest_epoch, MemoryMetaStore};
use crate::types::Vertex;

const SCHEMA: &str = r#"{
  "vertex_labels": [
    { "name": "person", "properties": [
      { "name": "name", "data_type": "STRING" },
      { "name": "age", "data_type": "INT" } ] },
    { "name": "city", "properties": [ { "name": "name", "data_type": "STRING" } ] } ],
  "edge_labels": [
    { "name": "knows", "src_label": "person", "dst_label": "person",
      "properties": [ { "name": "weight", "data_type": "DOUBLE" } ] },
    { "name": "lives_in", "src_label": "person", "dst_label": "city" } ] }"#;

const PERSON: LabelId = 0;
const CITY: LabelId = 1;
const KNOWS: LabelId = 0;
const LIVES_IN: LabelId = 1;

fn config() -> Arc<StoreConfig> {
  Arc::new(StoreConfig {
    vertex_per_seg: 4,
    max_vertices_per_label: 64,
    edge_arena_capacity: 1 << 22,
    arena_chunk_bytes: 1 << 12,
    rows_per_page: 8,
    property_arena_capacity: 1 << 22,
    string_buffer_capacity: 1 << 16,
    hashmap_initial_capacity: 16,
    ..Default::default()
  })
}

struct Harness {
  store: GraphStore,
  blobs: Arc<LocalBlobStore>,
  meta: Arc<MemoryMetaStore>,
}

impl Harness {
  fn new(fid: u64, fnum: u64) -> Self {
    let blobs = Arc::new(LocalBlobStore::new("test", 1 << 12));
    let meta = Arc::new(MemoryMetaStore::new());
    let schema = GraphSchema::from_json_str(SCHEMA).unwrap();
    let store = GraphStore::new(
      config(),
      &schema,
      fid,
      fnum,
      Arc::clone(&blobs) as Arc<dyn BlobStore>,
      Arc::clone(&meta) as Arc<dyn MetaStore>,
    )
    .unwrap();
    Self { store, blobs, meta }
  }

  fn gid(&self, fid: u64, label: LabelId, offset: u64) -> Gid {
    self.store.id_parser().generate_id(fid, label, offset)
  }

  fn apply(&mut self, line: &str) {
    assert!(self.store.apply_line(line).unwrap(), "rejected {line:?}");
  }

  fn finalize(&mut self) {
    self.store.finalize().unwrap();
  }

  fn fragment(&self, epoch: Epoch) -> Fragment {
    Fragment::open(
      self.meta.as_ref(),
      self.blobs.as_ref(),
      self.store.config(),
      self.store.fid(),
      Some(epoch),
    )
    .unwrap()
  }
}

fn vertex(f: &Fragment, gid: Gid) -> Vertex {
  f.gid2vertex(gid).unwrap()
}

fn out_gids(f: &Fragment, gid: Gid, elabel: LabelId) -> Vec<Gid> {
  let mut gids: Vec<Gid> = f
    .outgoing(vertex(f, gid), elabel)
    .map(|e| f.vertex2gid(e.neighbor()))
    .collect();
  gids.sort_unstable();
  gids
}

fn in_gids(f: &Fragment, gid: Gid, elabel: LabelId) -> Vec<Gid> {
  let mut gids: Vec<Gid> = f
    .incoming(vertex(f, gid), elabel)
    .map(|e| f.vertex2gid(e.neighbor()))
    .collect();
  gids.sort_unstable();
  gids
}

#[test]
fn test_new_rejects_bad_partition() {
  let schema = GraphSchema::from_json_str(SCHEMA).unwrap();
  let err = GraphStore::new(
    config(),
    &schema,
    2,
    2,
    Arc::new(LocalBlobStore::new("test", 1 << 12)),
    Arc::new(MemoryMetaStore::new()),
  )
  .unwrap_err();
  assert!(matches!(err, GraphError::Config(_)));
}

#[test]
fn test_local_edge_is_stored_on_both_lists() {
  let mut h = Harness::new(0, 1);
  let (a, b) = (h.gid(0, PERSON, 0), h.gid(0, PERSON, 1));
  h.apply(&format!("add_vertex|0|{a}|100|alice|30"));
  h.apply(&format!("add_vertex|0|{b}|101|bob|25"));
  h.apply(&format!("add_edge|0|knows|{a}|{b}|100|101|0.5"));
  h.apply(&format!("add_edge|1|knows|{b}|{a}|101|100|0.7"));
  h.finalize();

  let f0 = h.fragment(0);
  assert_eq!(out_gids(&f0, a, KNOWS), vec![b]);
  assert_eq!(in_gids(&f0, b, KNOWS), vec![a]);
  assert!(out_gids(&f0, b, KNOWS).is_empty());
  assert_eq!(f0.edge_num(), 1);
  let edge = f0.outgoing(vertex(&f0, a), KNOWS).next().unwrap();
  assert_eq!(edge.get_data::<f64>(0), Some(0.5));

  let f1 = h.fragment(1);
  assert_eq!(out_gids(&f1, b, KNOWS), vec![a]);
  assert_eq!(in_gids(&f1, a, KNOWS), vec![b]);
  assert_eq!(f1.edge_num(), 2);
  assert_eq!(f1.count_edges(), 2);
  assert_eq!(f1.outer_vertices(PERSON).count(), 0);
}

#[test]
fn test_foreign_destination_gets_a_mirror() {
  let mut h = Harness::new(0, 2);
  let a = h.gid(0, PERSON, 0);
  let remote = h.gid(1, PERSON, 3);
  h.apply(&format!("add_vertex|0|{a}|100|alice|30"));
  h.apply(&format!("add_edge|0|knows|{a}|{remote}|100|203|1.5"));
  h.finalize();

  let f = h.fragment(0);
  let mirrors: Vec<Vertex> = f.outer_vertices(PERSON).collect();
  assert_eq!(mirrors.len(), 1);
  let m = mirrors[0];
  assert!(f.is_outer(m));
  assert!(!f.is_inner(m));
  assert_eq!(f.vertex2gid(m), remote);
  assert_eq!(f.gid2vertex(remote), Some(m));
  assert_eq!(f.gid2oid(remote), Some(203));
  assert_eq!(f.oid2gid(PERSON, 203), Some(remote));
  assert_eq!(f.outer_vertex_num(PERSON), 1);

  assert_eq!(out_gids(&f, a, KNOWS), vec![remote]);
  assert_eq!(in_gids(&f, remote, KNOWS), vec![a]);
  assert_eq!(f.get_value(m, 0), None);
}

#[test]
fn test_foreign_source_keeps_out_list_on_mirror() {
  let mut h = Harness::new(1, 2);
  let local = h.gid(1, PERSON, 2);
  let remote = h.gid(0, PERSON, 5);
  h.apply(&format!("add_vertex|0|{local}|102|carol|41"));
  h.apply(&format!("add_edge|0|knows|{remote}|{local}|205|102|2.0"));
  h.finalize();

  let f = h.fragment(0);
  assert_eq!(out_gids(&f, remote, KNOWS), vec![local]);
  assert_eq!(in_gids(&f, local, KNOWS), vec![remote]);
  assert!(out_gids(&f, local, KNOWS).is_empty());
  assert_eq!(f.edge_num(), 1);
}

#[test]
fn test_records_of_other_partitions_are_skipped() {
  let mut h = Harness::new(0, 2);
  let (x, y) = (h.gid(1, PERSON, 0), h.gid(1, PERSON, 1));
  h.apply(&format!("add_vertex|0|{x}|100|x|1"));
  h.apply(&format!("add_edge|0|knows|{x}|{y}|100|101|0.1"));
  h.finalize();

  let stats = h.store.stats();
  assert_eq!(stats.skipped_foreign, 2);
  assert_eq!(stats.edge_num, 0);
  let f = h.fragment(0);
  assert_eq!(f.vertices(PERSON).count(), 0);
  assert_eq!(f.gid2vertex(x), None);
}

#[test]
fn test_reads_are_bound_to_their_epoch() {
  let mut h = Harness::new(0, 1);
  let (a, b) = (h.gid(0, PERSON, 0), h.gid(0, PERSON, 1));
  h.apply(&format!("add_vertex|0|{a}|100|alice|30"));
  h.apply(&format!("update_vertex|1|{a}|100|alice|31"));
  h.apply(&format!("add_vertex|1|{b}|101|bob|25"));
  h.finalize();

  let f0 = h.fragment(0);
  let f1 = h.fragment(1);
  let va = vertex(&f1, a);
  assert_eq!(f0.get_data::<i32>(va, 1), Some(30));
  assert_eq!(f1.get_data::<i32>(va, 1), Some(31));
  assert_eq!(f1.get_data::<String>(va, 0), Some("alice".to_string()));
  assert_eq!(f0.inner_vertices(PERSON).count(), 1);
  assert_eq!(f1.inner_vertices(PERSON).count(), 2);
  assert_eq!(f0.oid2gid(PERSON, 101), None);
  assert_eq!(f1.oid2gid(PERSON, 101), Some(b));
  assert_eq!(f1.gid2oid(b), Some(101));
}

#[test]
fn test_delete_vertex_cascades_to_edges() {
  let mut h = Harness::new(0, 1);
  let (a, b, c) = (h.gid(0, PERSON, 0), h.gid(0, PERSON, 1), h.gid(0, PERSON, 2));
  let town = h.gid(0, CITY, 0);
  h.apply(&format!("add_vertex|0|{a}|100|alice|30"));
  h.apply(&format!("add_vertex|0|{b}|101|bob|25"));
  h.apply(&format!("add_vertex|0|{c}|102|carol|41"));
  h.apply(&format!("add_vertex|0|{town}|900|springfield"));
  h.apply(&format!("add_edge|0|knows|{a}|{b}|100|101|0.5"));
  h.apply(&format!("add_edge|0|knows|{c}|{a}|102|100|0.6"));
  h.apply(&format!("add_edge|0|lives_in|{a}|{town}|100|900"));
  h.apply(&format!("add_edge|0|knows|{b}|{c}|101|102|0.7"));
  h.apply(&format!("delete_vertex|1|{a}|100"));
  h.finalize();

  let f1 = h.fragment(1);
  assert_eq!(f1.gid2vertex(a), None);
  assert_eq!(f1.oid2gid(PERSON, 100), None);
  assert!(in_gids(&f1, b, KNOWS).is_empty());
  assert!(out_gids(&f1, c, KNOWS).is_empty());
  assert!(in_gids(&f1, town, LIVES_IN).is_empty());
  assert_eq!(out_gids(&f1, b, KNOWS), vec![c]);
  assert_eq!(f1.edge_num(), 1);
  assert_eq!(f1.count_edges(), 1);
  assert_eq!(f1.inner_vertices(PERSON).count(), 2);

  let f0 = h.fragment(0);
  assert_eq!(out_gids(&f0, a, KNOWS), vec![b]);
  assert_eq!(in_gids(&f0, town, LIVES_IN), vec![a]);
  assert_eq!(f0.edge_num(), 4);
}

#[test]
fn test_delete_mirror_vertex() {
  let mut h = Harness::new(0, 2);
  let a = h.gid(0, PERSON, 0);
  let remote = h.gid(1, PERSON, 3);
  h.apply(&format!("add_vertex|0|{a}|100|alice|30"));
  h.apply(&format!("add_edge|0|knows|{a}|{remote}|100|203|1.5"));
  h.apply(&format!("delete_vertex|1|{remote}|203"));
  h.finalize();

  let f1 = h.fragment(1);
  assert_eq!(f1.outer_vertices(PERSON).count(), 0);
  assert_eq!(f1.gid2vertex(remote), None);
  assert!(out_gids(&f1, a, KNOWS).is_empty());
  assert_eq!(f1.edge_num(), 0);

  let f0 = h.fragment(0);
  assert_eq!(out_gids(&f0, a, KNOWS), vec![remote]);
}

#[test]
fn test_old_epoch_keeps_vertex_after_offset_reuse() {
  let mut h = Harness::new(0, 1);
  let a = h.gid(0, PERSON, 0);
  h.apply(&format!("add_vertex|1|{a}|100|alice|30"));
  h.apply(&format!("delete_vertex|2|{a}|100"));
  h.apply(&format!("add_vertex|3|{a}|200|amy|40"));
  h.finalize();

  let f1 = h.fragment(1);
  assert_eq!(f1.gid2oid(a), Some(100));
  assert_eq!(f1.oid2gid(PERSON, 100), Some(a));
  let v = vertex(&f1, a);
  assert_eq!(f1.get_data::<String>(v, 0), Some("alice".to_string()));
  assert_eq!(f1.get_data::<i32>(v, 1), Some(30));

  let f2 = h.fragment(2);
  assert_eq!(f2.gid2oid(a), None);
  assert_eq!(f2.gid2vertex(a), None);
  assert_eq!(f2.oid2gid(PERSON, 100), None);
  // Rows of deleted vertices stay in the pages but are not readable
  assert_eq!(f2.get_value(v, 0), None);

  let f3 = h.fragment(3);
  assert_eq!(f3.gid2oid(a), Some(200));
  assert_eq!(f3.oid2gid(PERSON, 100), None);
  assert_eq!(f3.get_data::<String>(vertex(&f3, a), 0), Some("amy".to_string()));
}

#[test]
fn test_rejected_edge_creates_no_mirror() {
  let mut h = Harness::new(0, 2);
  let (a, missing) = (h.gid(0, PERSON, 0), h.gid(0, PERSON, 1));
  let remote = h.gid(1, PERSON, 3);
  h.apply(&format!("add_vertex|0|{a}|100|alice|30"));
  for op in ["add_edge", "update_edge"] {
    let line = format!("{op}|1|knows|{remote}|{missing}|203|101|0.5");
    assert!(!h.store.apply_line(&line).unwrap(), "accepted {line:?}");
  }
  h.finalize();

  let f = h.fragment(1);
  assert_eq!(f.outer_vertices(PERSON).count(), 0);
  assert_eq!(f.outer_vertex_num(PERSON), 0);
  assert_eq!(f.oid2gid(PERSON, 203), None);
  assert_eq!(f.gid2vertex(remote), None);
  assert_eq!(f.edge_num(), 0);
}

#[test]
fn test_update_edge_replaces_properties() {
  let mut h = Harness::new(0, 1);
  let (a, b) = (h.gid(0, PERSON, 0), h.gid(0, PERSON, 1));
  h.apply(&format!("add_vertex|0|{a}|100|alice|30"));
  h.apply(&format!("add_vertex|0|{b}|101|bob|25"));
  h.apply(&format!("add_edge|0|knows|{a}|{b}|100|101|0.5"));
  h.apply(&format!("update_edge|1|knows|{a}|{b}|100|101|0.9"));
  // No live edge to replace: the update inserts one
  h.apply(&format!("update_edge|2|knows|{b}|{a}|101|100|0.1"));
  h.finalize();

  let weight = |f: &Fragment| -> Vec<f64> {
    f.outgoing(vertex(f, a), KNOWS)
      .filter_map(|e| e.get_data::<f64>(0))
      .collect()
  };
  assert_eq!(weight(&h.fragment(0)), vec![0.5]);
  assert_eq!(weight(&h.fragment(1)), vec![0.9]);
  let f2 = h.fragment(2);
  assert_eq!(f2.edge_num(), 2);
  assert_eq!(out_gids(&f2, b, KNOWS), vec![a]);
}

#[test]
fn test_malformed_records_are_skipped() {
  let mut h = Harness::new(0, 1);
  let (a, b) = (h.gid(0, PERSON, 0), h.gid(0, PERSON, 1));
  h.apply(&format!("add_vertex|0|{a}|100|alice|30"));
  h.apply(&format!("add_vertex|0|{b}|101|bob|25"));
  for line in [
    format!("delete_edge|0|knows|{a}|{b}|100|101"),
    format!("add_vertex|0|{a}|100|alice|30"),
    format!("update_vertex|0|{}|105|nobody|1", h.gid(0, PERSON, 9)),
    format!("add_edge|0|knows|{a}|{}|100|109|0.1", h.gid(0, PERSON, 9)),
    "add_vertex|0|not-a-gid|1|x|1".to_string(),
  ] {
    assert!(!h.store.apply_line(&line).unwrap(), "accepted {line:?}");
  }
  assert_eq!(h.store.stats().applied, 2);
  assert_eq!(h.store.stats().edge_num, 0);
}

#[test]
fn test_stale_records_are_skipped() {
  let mut h = Harness::new(0, 1);
  let (a, b) = (h.gid(0, PERSON, 0), h.gid(0, PERSON, 1));
  h.apply(&format!("add_vertex|2|{a}|100|alice|30"));
  h.apply(&format!("add_vertex|1|{b}|101|bob|25"));
  assert_eq!(h.store.stats().skipped_stale, 1);
  assert_eq!(h.store.current_epoch(), Some(2));

  h.apply(&format!("add_vertex|3|{b}|101|bob|25"));
  assert_eq!(h.store.last_finalized(), Some(2));
  // Epoch 2 is sealed now
  h.apply(&format!("update_vertex|2|{a}|100|alice|99"));
  assert_eq!(h.store.stats().skipped_stale, 2);
  h.finalize();

  let f = h.fragment(3);
  assert_eq!(f.get_data::<i32>(vertex(&f, a), 1), Some(30));
}

#[test]
fn test_bulk_load_end_finalizes_and_raises_floor() {
  let mut h = Harness::new(0, 1);
  let a = h.gid(0, PERSON, 0);
  let b = h.gid(0, PERSON, 1);
  h.apply(&format!("add_vertex|0|{a}|100|alice|30|7"));
  h.apply("bulkload_end|5|8");
  assert_eq!(h.store.last_finalized(), Some(0));
  assert_eq!(h.store.current_epoch(), None);
  assert_eq!(h.store.last_log_offset(), Some(8));

  h.apply(&format!("add_vertex|3|{b}|101|bob|25"));
  assert_eq!(h.store.stats().skipped_stale, 1);
  h.apply(&format!("add_vertex|5|{b}|101|bob|25|9"));
  assert_eq!(h.store.current_epoch(), Some(5));
  assert_eq!(h.store.last_log_offset(), Some(9));
}

#[test]
fn test_finalize_publishes_latest_epoch() {
  let mut h = Harness::new(0, 1);
  assert_eq!(latest_epoch(h.meta.as_ref(), "", 0).unwrap(), None);
  assert!(h.store.finalize().unwrap().is_none());

  let a = h.gid(0, PERSON, 0);
  h.apply(&format!("add_vertex|4|{a}|100|alice|30"));
  let metadata = h.store.finalize().unwrap().unwrap();
  assert_eq!(metadata.epoch, 4);
  assert_eq!(metadata.total_vertex_num, 1);
  assert_eq!(latest_epoch(h.meta.as_ref(), "", 0).unwrap(), Some(4));

  let f = Fragment::open(h.meta.as_ref(), h.blobs.as_ref(), h.store.config(), 0, None).unwrap();
  assert_eq!(f.epoch(), 4);
  assert!(matches!(
    Fragment::open(h.meta.as_ref(), h.blobs.as_ref(), h.store.config(), 0, Some(3)),
    Err(GraphError::MetadataNotFound(_))
  ));
}

#[test]
fn test_gc_reclaims_old_property_versions() {
  let mut h = Harness::new(0, 1);
  let a = h.gid(0, PERSON, 0);
  h.apply(&format!("add_vertex|0|{a}|100|alice|30"));
  for epoch in 1..=3 {
    h.apply(&format!("update_vertex|{epoch}|{a}|100|alice|{}", 30 + epoch));
  }
  h.finalize();
  assert_eq!(h.store.page_version_count(PERSON, 0, 0), 4);

  let stats = h.store.gc(3);
  assert_eq!(stats.pages_freed, 3);
  assert_eq!(h.store.page_version_count(PERSON, 0, 0), 1);
  let f = h.fragment(3);
  assert_eq!(f.get_data::<i32>(vertex(&f, a), 1), Some(33));
}
