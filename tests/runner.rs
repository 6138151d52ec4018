use std::sync::Arc;

use epochgraph::{
  BackoffConfig, BlobStore, Fragment, GraphSchema, GraphStore, GraphView, LocalBlobStore,
  LogRunner, MemoryMetaStore, MetaStore, RunnerPool, StoreConfig,
};
use tracing_subscriber::EnvFilter;

const SCHEMA: &str = r#"{
  "vertex_labels": [ { "name": "node", "properties": [ { "name": "v", "data_type": "INT" } ] } ],
  "edge_labels": [ { "name": "link", "src_label": "node", "dst_label": "node" } ] }"#;

fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

fn config(blocking: bool) -> Arc<StoreConfig> {
  Arc::new(StoreConfig {
    vertex_per_seg: 16,
    max_vertices_per_label: 512,
    edge_arena_capacity: 1 << 22,
    arena_chunk_bytes: 1 << 12,
    rows_per_page: 32,
    property_arena_capacity: 1 << 22,
    string_buffer_capacity: 1 << 12,
    hashmap_initial_capacity: 64,
    queue_capacity: 2,
    backoff: BackoffConfig {
      blocking,
      ..Default::default()
    },
    ..Default::default()
  })
}

fn store(
  config: Arc<StoreConfig>,
  fid: u64,
  fnum: u64,
  blobs: &Arc<LocalBlobStore>,
  meta: &Arc<MemoryMetaStore>,
) -> GraphStore {
  GraphStore::new(
    config,
    &GraphSchema::from_json_str(SCHEMA).expect("schema"),
    fid,
    fnum,
    Arc::clone(blobs) as Arc<dyn BlobStore>,
    Arc::clone(meta) as Arc<dyn MetaStore>,
  )
  .expect("store")
}

fn run_small_queue(blocking: bool) {
  init_tracing();
  let blobs = Arc::new(LocalBlobStore::new("runner", 1 << 12));
  let meta = Arc::new(MemoryMetaStore::new());
  let s = store(config(blocking), 0, 1, &blobs, &meta);
  let parser = *s.id_parser();
  let runner = LogRunner::spawn(s).expect("spawn");
  assert_eq!(runner.fid(), 0);

  for i in 0..300u64 {
    let epoch = i / 100;
    runner
      .submit(format!("add_vertex|{epoch}|{}|{i}|{i}", parser.generate_id(0, 0, i)))
      .expect("submit");
  }
  runner.submit("add_vertex|2|garbage").expect("submit");
  runner.submit("bulkload_end|7").expect("submit");

  let (store, stats) = runner.shutdown().expect("shutdown");
  assert_eq!(stats.lines, 302);
  assert_eq!(stats.applied, 301);
  assert_eq!(stats.skipped, 1);
  assert_eq!(store.last_finalized(), Some(2));
  assert_eq!(store.stats().finalized_epochs, 3);

  let f = Fragment::open(meta.as_ref(), blobs.as_ref(), &config(blocking), 0, Some(1))
    .expect("open");
  assert_eq!(f.inner_vertices(0).count(), 200);
  assert_eq!(f.get_data::<i32>(f.gid2vertex(parser.generate_id(0, 0, 150)).expect("v"), 0), Some(150));
}

#[test]
fn spinning_runner_drains_a_full_queue() {
  run_small_queue(false);
}

#[test]
fn blocking_runner_drains_a_full_queue() {
  run_small_queue(true);
}

#[test]
fn latest_epoch_follows_finalization() {
  init_tracing();
  let blobs = Arc::new(LocalBlobStore::new("runner-latest", 1 << 12));
  let meta = Arc::new(MemoryMetaStore::new());
  let s = store(config(true), 0, 1, &blobs, &meta);
  let gid = s.id_parser().generate_id(0, 0, 0);
  let runner = LogRunner::spawn(s).expect("spawn");
  assert_eq!(runner.latest_epoch(), None);

  runner.submit(format!("add_vertex|3|{gid}|1|1")).expect("submit");
  runner.submit("bulkload_end|4").expect("submit");
  while runner.latest_epoch().is_none() {
    std::thread::yield_now();
  }
  assert_eq!(runner.latest_epoch(), Some(3));
  let (store, _) = runner.shutdown().expect("shutdown");
  assert_eq!(store.current_epoch(), None);
}

#[test]
fn pool_routes_by_partition() {
  init_tracing();
  let blobs = Arc::new(LocalBlobStore::new("runner-pool", 1 << 12));
  let meta = Arc::new(MemoryMetaStore::new());
  let stores: Vec<GraphStore> = (0..3)
    .map(|fid| store(config(false), fid, 3, &blobs, &meta))
    .collect();
  let parser = *stores[0].id_parser();
  let pool = RunnerPool::spawn(stores).expect("spawn");
  assert_eq!(pool.len(), 3);
  assert!(pool.runner(2).is_some());
  assert!(pool.runner(3).is_none());

  for i in 0..30u64 {
    let gid = parser.generate_id(i % 3, 0, i / 3);
    pool.broadcast(&format!("add_vertex|0|{gid}|{i}|{i}")).expect("broadcast");
  }
  for i in 0..30u64 {
    let src = parser.generate_id(i % 3, 0, i / 3);
    let j = (i + 1) % 30;
    let dst = parser.generate_id(j % 3, 0, j / 3);
    pool
      .broadcast(&format!("add_edge|1|link|{src}|{dst}|{i}|{j}"))
      .expect("broadcast");
  }

  let finished = pool.shutdown().expect("shutdown");
  assert_eq!(finished.len(), 3);
  for (fid, (store, stats)) in finished.iter().enumerate() {
    assert_eq!(store.fid(), fid as u64);
    assert_eq!(stats.skipped, 0);
    assert_eq!(store.stats().vertex_num, 10);
    // Every ring edge crosses partitions: 10 out, 10 in
    assert_eq!(store.stats().edge_num, 20);
    assert_eq!(store.stats().skipped_foreign, 20 + 10);
  }
}
