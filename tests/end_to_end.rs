use std::collections::BTreeSet;
use std::sync::Arc;

use epochgraph::meta::latest_epoch;
use epochgraph::{
  check_fragment, BlobStore, DirMetaStore, Fragment, GraphSchema, GraphStore, GraphView, IdParser,
  LocalBlobStore, MetaStore, RunnerPool, StoreConfig,
};
use tracing_subscriber::EnvFilter;

const FNUM: u64 = 2;

const SCHEMA: &str = r#"{
  "vertex_labels": [
    { "name": "person", "table": "person",
      "properties": [
        { "name": "name", "data_type": "STRING" },
        { "name": "score", "data_type": "DOUBLE" } ] } ],
  "edge_labels": [
    { "name": "follows", "src_label": "person", "dst_label": "person",
      "properties": [ { "name": "since", "data_type": "DATE" } ] } ] }"#;

fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

fn config() -> Arc<StoreConfig> {
  Arc::new(StoreConfig {
    vertex_per_seg: 8,
    max_vertices_per_label: 256,
    edge_arena_capacity: 1 << 22,
    arena_chunk_bytes: 1 << 14,
    rows_per_page: 16,
    property_arena_capacity: 1 << 22,
    string_buffer_capacity: 1 << 16,
    hashmap_initial_capacity: 16,
    queue_capacity: 8,
    ..Default::default()
  })
}

/// Vertex `i` lives on partition `i % FNUM` at offset `i / FNUM`
fn gid(parser: &IdParser, i: u64) -> u64 {
  parser.generate_id(i % FNUM, 0, i / FNUM)
}

/// Log of 20 vertices and a ring plus chords, over four epochs
fn log(parser: &IdParser) -> (Vec<String>, BTreeSet<(u64, u64)>) {
  let mut lines = Vec::new();
  let mut edges = BTreeSet::new();
  for i in 0..20u64 {
    lines.push(format!("add_vertex|0|{}|{}|p{i}|{}.5", gid(parser, i), 1000 + i, i));
  }
  lines.push("bulkload_end|1".to_string());
  for epoch in 1..4u64 {
    for i in 0..20u64 {
      let j = (i + epoch) % 20;
      lines.push(format!(
        "add_edge|{epoch}|follows|{}|{}|{}|{}|2024-01-0{epoch}",
        gid(parser, i),
        gid(parser, j),
        1000 + i,
        1000 + j
      ));
      edges.insert((i, j));
    }
  }
  lines.push(format!("delete_vertex|4|{}|1000", gid(parser, 0)));
  edges.retain(|&(s, d)| s != 0 && d != 0);
  (lines, edges)
}

#[test]
fn partitions_agree_on_the_global_graph() {
  init_tracing();
  let dir = tempfile::tempdir().expect("tempdir");
  let meta: Arc<dyn MetaStore> = Arc::new(DirMetaStore::open(dir.path()).expect("meta dir"));
  let blobs = Arc::new(LocalBlobStore::new("e2e", 1 << 14));
  let schema = GraphSchema::from_json_str(SCHEMA).expect("schema");

  let stores: Vec<GraphStore> = (0..FNUM)
    .map(|fid| {
      GraphStore::new(
        config(),
        &schema,
        fid,
        FNUM,
        Arc::clone(&blobs) as Arc<dyn BlobStore>,
        Arc::clone(&meta),
      )
      .expect("store")
    })
    .collect();
  let parser = *stores[0].id_parser();
  let (lines, expected) = log(&parser);

  let pool = RunnerPool::spawn(stores).expect("spawn runners");
  for line in &lines {
    pool.broadcast(line).expect("broadcast");
  }
  let finished = pool.shutdown().expect("shutdown");
  for (store, stats) in &finished {
    assert_eq!(stats.lines, lines.len() as u64);
    assert_eq!(stats.skipped, 0);
    assert_eq!(store.last_finalized(), Some(4));
  }

  let mut seen_out = BTreeSet::new();
  let mut seen_in = BTreeSet::new();
  for fid in 0..FNUM {
    assert_eq!(
      latest_epoch(meta.as_ref(), "", fid).expect("latest"),
      Some(4)
    );
    let f = Fragment::open(meta.as_ref(), blobs.as_ref(), &config(), fid, None).expect("open");
    let result = check_fragment(&f);
    assert!(result.valid, "partition {fid}: {:?}", result.errors);

    let oid = |v| f.gid2oid(f.vertex2gid(v)).expect("oid") as u64 - 1000;
    for v in f.inner_vertices(0) {
      let me = oid(v);
      assert_eq!(f.get_data::<String>(v, 0), Some(format!("p{me}")));
      assert_eq!(f.get_data::<f64>(v, 1), Some(me as f64 + 0.5));
      for e in f.outgoing(v, 0) {
        assert!(seen_out.insert((me, oid(e.neighbor()))));
        assert!(e.get_value(0).is_some());
      }
      for e in f.incoming(v, 0) {
        assert!(seen_in.insert((oid(e.neighbor()), me)));
      }
    }
    assert_eq!(f.inner_vertex_num(0), if fid == 0 { 9 } else { 10 });
  }
  assert_eq!(seen_out, expected);
  assert_eq!(seen_in, expected);
}

#[test]
fn older_epochs_stay_readable_after_ingest() {
  init_tracing();
  let meta: Arc<dyn MetaStore> = Arc::new(epochgraph::MemoryMetaStore::new());
  let blobs = Arc::new(LocalBlobStore::new("e2e-history", 1 << 14));
  let schema = GraphSchema::from_json_str(SCHEMA).expect("schema");
  let mut store = GraphStore::new(
    config(),
    &schema,
    1,
    FNUM,
    Arc::clone(&blobs) as Arc<dyn BlobStore>,
    Arc::clone(&meta),
  )
  .expect("store");
  let parser = *store.id_parser();
  let (lines, _) = log(&parser);
  for line in &lines {
    assert!(store.apply_line(line).expect("apply"), "{line}");
  }
  store.finalize().expect("finalize");

  let expected_edges = [0u64, 20, 30, 50, 46];
  for (epoch, &edges) in expected_edges.iter().enumerate() {
    let f = Fragment::open(meta.as_ref(), blobs.as_ref(), &config(), 1, Some(epoch as u64))
      .expect("open");
    assert_eq!(f.count_edges(), edges, "epoch {epoch}");
    assert_eq!(f.edge_num(), edges, "epoch {epoch}");
  }
}
