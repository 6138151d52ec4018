use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use epochgraph::meta::latest_epoch;
use epochgraph::{
  BlobStore, Fragment, GraphSchema, GraphStore, GraphView, LocalBlobStore, LogRunner,
  MemoryMetaStore, MetaStore, StoreConfig,
};
use tracing_subscriber::EnvFilter;

const EPOCHS: u64 = 40;

const SCHEMA: &str = r#"{
  "vertex_labels": [
    { "name": "step", "properties": [ { "name": "counter", "data_type": "LONG" } ] } ],
  "edge_labels": [ { "name": "next", "src_label": "step", "dst_label": "step" } ] }"#;

fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

fn config() -> Arc<StoreConfig> {
  Arc::new(StoreConfig {
    vertex_per_seg: 4,
    max_vertices_per_label: 128,
    edge_arena_capacity: 1 << 22,
    arena_chunk_bytes: 1 << 12,
    rows_per_page: 8,
    property_arena_capacity: 1 << 22,
    string_buffer_capacity: 1 << 12,
    hashmap_initial_capacity: 4,
    queue_capacity: 4,
    ..Default::default()
  })
}

/// Everything a reader at `epoch` must see, and nothing more
fn verify(f: &Fragment, epoch: u64) {
  let vertices: Vec<_> = f.inner_vertices(0).collect();
  assert_eq!(vertices.len() as u64, epoch + 1, "epoch {epoch}");
  assert_eq!(f.count_edges(), epoch, "epoch {epoch}");
  assert_eq!(f.edge_num(), epoch, "epoch {epoch}");

  let first = f.gid2vertex(f.oid2gid(0, 0).expect("first step")).expect("first vertex");
  assert_eq!(f.get_data::<i64>(first, 0), Some(epoch as i64), "epoch {epoch}");
  assert_eq!(f.oid2gid(0, epoch as i64 + 1), None, "epoch {epoch}");
  for v in vertices {
    let oid = f.gid2oid(f.vertex2gid(v)).expect("oid");
    let expected = usize::from(oid as u64 != epoch);
    assert_eq!(f.outgoing(v, 0).count(), expected, "epoch {epoch} step {oid}");
  }
}

#[test]
fn readers_never_see_a_later_epoch() {
  init_tracing();
  let blobs = Arc::new(LocalBlobStore::new("isolation", 1 << 12));
  let meta = Arc::new(MemoryMetaStore::new());
  let store = GraphStore::new(
    config(),
    &GraphSchema::from_json_str(SCHEMA).expect("schema"),
    0,
    1,
    Arc::clone(&blobs) as Arc<dyn BlobStore>,
    Arc::clone(&meta) as Arc<dyn MetaStore>,
  )
  .expect("store");
  let parser = *store.id_parser();
  let gid = move |i: u64| parser.generate_id(0, 0, i);

  let done = Arc::new(AtomicBool::new(false));
  let reader = {
    let blobs = Arc::clone(&blobs);
    let meta = Arc::clone(&meta);
    let done = Arc::clone(&done);
    thread::spawn(move || {
      let deadline = Instant::now() + Duration::from_secs(60);
      let mut seen = Vec::new();
      loop {
        let finished = done.load(Ordering::Acquire);
        if let Some(epoch) = latest_epoch(meta.as_ref(), "", 0).expect("latest") {
          if seen.last() != Some(&epoch) {
            let f = Fragment::open(meta.as_ref(), blobs.as_ref(), &config(), 0, Some(epoch))
              .expect("open");
            verify(&f, epoch);
            seen.push(epoch);
          }
          if epoch == EPOCHS - 1 {
            break;
          }
        }
        assert!(!finished || Instant::now() < deadline, "last epoch never published");
        thread::yield_now();
      }
      seen
    })
  };

  let runner = LogRunner::spawn(store).expect("spawn");
  runner
    .submit(format!("add_vertex|0|{}|0|0", gid(0)))
    .expect("submit");
  for epoch in 1..EPOCHS {
    runner
      .submit(format!("add_vertex|{epoch}|{}|{epoch}|0", gid(epoch)))
      .expect("submit");
    runner
      .submit(format!(
        "add_edge|{epoch}|next|{}|{}|{}|{epoch}",
        gid(epoch - 1),
        gid(epoch),
        epoch - 1
      ))
      .expect("submit");
    runner
      .submit(format!("update_vertex|{epoch}|{}|0|{epoch}", gid(0)))
      .expect("submit");
  }
  let (store, stats) = runner.shutdown().expect("shutdown");
  done.store(true, Ordering::Release);
  assert_eq!(stats.skipped, 0);
  assert_eq!(store.last_finalized(), Some(EPOCHS - 1));

  let seen = reader.join().expect("reader thread");
  assert!(seen.windows(2).all(|w| w[0] < w[1]));
  assert_eq!(seen.last(), Some(&(EPOCHS - 1)));

  for epoch in [0, EPOCHS / 2, EPOCHS - 1] {
    let f = Fragment::open(meta.as_ref(), blobs.as_ref(), &config(), 0, Some(epoch)).expect("open");
    verify(&f, epoch);
  }
}
