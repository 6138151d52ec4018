use std::sync::Arc;

use proptest::prelude::*;

use super::*;
use crate::constants::TOMBSTONE_BIT;
use crate::core::arena::LocalBlobStore;

fn config() -> Arc<StoreConfig> {
  Arc::new(StoreConfig {
    vertex_per_seg: 4,
    max_vertices_per_label: 64,
    edge_arena_capacity: 1 << 22,
    arena_chunk_bytes: 1 << 12,
    ..Default::default()
  })
}

fn graph(prop_bytes: Vec<u64>) -> (LocalBlobStore, SegGraph) {
  let store = LocalBlobStore::new("test", 1 << 12);
  let graph = SegGraph::new(&store, "test edges", config(), prop_bytes).unwrap();
  (store, graph)
}

fn neighbors(iter: EdgeIter<'_>) -> Vec<u64> {
  let mut out: Vec<u64> = iter.map(|e| e.neighbor()).collect();
  out.sort_unstable();
  out
}

#[test]
fn test_missing_segment_reads_empty() {
  let (_store, g) = graph(vec![0]);
  assert!(!g.view().has_segment(5, 0, Direction::Out));
  assert_eq!(g.create_graph_reader(10).outgoing(5, 0).count(), 0);
  assert_eq!(g.stats().segments, 0);
}

#[test]
fn test_put_and_read_back() {
  let (_store, g) = graph(vec![0, 0]);
  let w = g.create_graph_writer(1);
  w.put_edge(0, 0, Direction::Out, 10, &[]).unwrap();
  w.put_edge(0, 0, Direction::Out, 11, &[]).unwrap();
  w.put_edge(0, 1, Direction::Out, 12, &[]).unwrap();
  w.put_edge(0, 0, Direction::In, 13, &[]).unwrap();

  let r = g.create_graph_reader(1);
  assert_eq!(neighbors(r.outgoing(0, 0)), vec![10, 11]);
  assert_eq!(neighbors(r.outgoing(0, 1)), vec![12]);
  assert_eq!(neighbors(r.incoming(0, 0)), vec![13]);
  assert_eq!(r.degree(1, 0, Direction::Out), 0);
  assert_eq!(g.stats().segments, 1);
}

#[test]
fn test_newest_first_order() {
  let (_store, g) = graph(vec![0]);
  let w = g.create_graph_writer(1);
  for dst in 0..5 {
    w.put_edge(2, 0, Direction::Out, dst, &[]).unwrap();
  }
  let order: Vec<u64> = g.create_graph_reader(1).outgoing(2, 0).map(|e| e.neighbor()).collect();
  assert_eq!(order, vec![4, 3, 2, 1, 0]);
}

#[test]
fn test_reader_never_sees_later_epochs() {
  let (_store, g) = graph(vec![0]);
  g.create_graph_writer(1).put_edge(0, 0, Direction::Out, 1, &[]).unwrap();
  g.create_graph_writer(2).put_edge(0, 0, Direction::Out, 2, &[]).unwrap();
  g.create_graph_writer(4).put_edge(0, 0, Direction::Out, 4, &[]).unwrap();

  assert!(neighbors(g.create_graph_reader(0).outgoing(0, 0)).is_empty());
  assert_eq!(neighbors(g.create_graph_reader(1).outgoing(0, 0)), vec![1]);
  assert_eq!(neighbors(g.create_graph_reader(3).outgoing(0, 0)), vec![1, 2]);
  assert_eq!(neighbors(g.create_graph_reader(9).outgoing(0, 0)), vec![1, 2, 4]);
  assert_eq!(g.view().checkpoint_epochs(0, 0, Direction::Out), vec![1, 2, 4]);
}

#[test]
fn test_delete_is_versioned() {
  let (_store, g) = graph(vec![0]);
  let w1 = g.create_graph_writer(1);
  w1.put_edge(1, 0, Direction::Out, 7, &[]).unwrap();
  w1.put_edge(1, 0, Direction::Out, 8, &[]).unwrap();
  let w2 = g.create_graph_writer(2);
  assert!(w2.delete_edge(1, 0, Direction::Out, 7).unwrap());
  assert!(!w2.delete_edge(1, 0, Direction::Out, 7).unwrap());
  assert!(!w2.delete_edge(1, 0, Direction::Out, 99).unwrap());

  assert_eq!(neighbors(g.create_graph_reader(1).outgoing(1, 0)), vec![7, 8]);
  assert_eq!(neighbors(g.create_graph_reader(2).outgoing(1, 0)), vec![8]);
}

#[test]
fn test_delete_cancels_newest_duplicate() {
  let (_store, g) = graph(vec![8]);
  let w = g.create_graph_writer(1);
  w.put_edge(0, 0, Direction::Out, 5, &1u64.to_le_bytes()).unwrap();
  w.put_edge(0, 0, Direction::Out, 5, &2u64.to_le_bytes()).unwrap();
  assert!(w.delete_edge(0, 0, Direction::Out, 5).unwrap());
  let left: Vec<Vec<u8>> = g
    .create_graph_reader(1)
    .outgoing(0, 0)
    .map(|e| e.props(8))
    .collect();
  assert_eq!(left, vec![1u64.to_le_bytes().to_vec()]);
}

#[test]
fn test_chain_growth_across_blocks() {
  let (_store, g) = graph(vec![4]);
  let w = g.create_graph_writer(1);
  for dst in 0..500u64 {
    w.put_edge(3, 0, Direction::Out, dst, &(dst as u32).to_le_bytes()).unwrap();
  }
  let r = g.create_graph_reader(1);
  let mut seen = 0;
  for entry in r.outgoing(3, 0) {
    let props = entry.props(4);
    assert_eq!(u32::from_le_bytes(props.try_into().unwrap()) as u64, entry.neighbor());
    seen += 1;
  }
  assert_eq!(seen, 500);
  assert!(g.stats().blocks > 1);
  assert_eq!(g.stats().compactions, 0);
}

#[test]
fn test_epoch_table_growth() {
  let (_store, g) = graph(vec![0]);
  for epoch in 1..=40u64 {
    g.create_graph_writer(epoch)
      .put_edge(0, 0, Direction::Out, epoch, &[])
      .unwrap();
  }
  for epoch in [1u64, 17, 40] {
    assert_eq!(
      g.create_graph_reader(epoch).degree(0, 0, Direction::Out),
      epoch as usize
    );
  }
  assert_eq!(g.view().checkpoint_epochs(0, 0, Direction::Out).len(), 40);
}

#[test]
fn test_compaction_conserves_live_edges() {
  let (_store, g) = graph(vec![8]);
  let w1 = g.create_graph_writer(1);
  for dst in 0..40u64 {
    w1.put_edge(0, 0, Direction::Out, dst, &(dst * 100).to_le_bytes()).unwrap();
  }
  let w2 = g.create_graph_writer(2);
  for dst in (0..40u64).step_by(2) {
    assert!(w2.delete_edge(0, 0, Direction::Out, dst).unwrap());
  }

  let before: Vec<(u64, Vec<u8>)> = {
    let mut v: Vec<_> = w2
      .edges(0, 0, Direction::Out)
      .map(|e| (e.neighbor(), e.props(8)))
      .collect();
    v.sort();
    v
  };

  let w3 = g.create_graph_writer(3);
  let mut extra = 0;
  while g.stats().compactions == 0 {
    w3.put_edge(0, 0, Direction::Out, 1000 + extra, &0u64.to_le_bytes())
      .unwrap();
    extra += 1;
    assert!(extra < 1000, "compaction never triggered");
  }

  let mut after: Vec<(u64, Vec<u8>)> = g
    .create_graph_reader(3)
    .outgoing(0, 0)
    .map(|e| (e.neighbor(), e.props(8)))
    .filter(|(dst, _)| *dst < 1000)
    .collect();
  after.sort();
  assert_eq!(before, after);
  assert_eq!(
    g.create_graph_reader(3).degree(0, 0, Direction::Out),
    20 + extra as usize
  );

  // Readers of earlier epochs still walk the retired chain
  assert_eq!(g.create_graph_reader(1).degree(0, 0, Direction::Out), 40);
  assert_eq!(g.create_graph_reader(2).degree(0, 0, Direction::Out), 20);
}

#[test]
fn test_recycle_waits_for_lag() {
  let (_store, g) = graph(vec![0]);
  let w1 = g.create_graph_writer(1);
  for dst in 0..8u64 {
    w1.put_edge(0, 0, Direction::Out, dst, &[]).unwrap();
  }
  for dst in 0..8u64 {
    w1.delete_edge(0, 0, Direction::Out, dst).unwrap();
  }
  let w2 = g.create_graph_writer(2);
  while g.stats().compactions == 0 {
    w2.put_edge(0, 0, Direction::Out, 99, &[]).unwrap();
  }
  assert!(g.stats().retired_pending > 0);
  assert_eq!(g.recycle_blocks(3), 0);
  let freed = g.recycle_blocks(4);
  assert!(freed > 0);
  assert_eq!(g.stats().retired_pending, 0);
  assert_eq!(g.stats().allocator.free_blocks, freed);
}

#[test]
fn test_attached_view_matches_writer() {
  let (store, g) = graph(vec![0]);
  let w = g.create_graph_writer(5);
  w.ensure_vertex(9).unwrap();
  w.put_edge(9, 0, Direction::In, 42, &[]).unwrap();
  let meta = g.meta();
  assert_eq!(meta.vertex_count, 10);

  let view = SegGraphView::attach(&store, meta).unwrap();
  assert_eq!(neighbors(view.reader(5).incoming(9, 0)), vec![42]);
}

#[test]
fn test_vertex_capacity() {
  let (_store, g) = graph(vec![0]);
  let w = g.create_graph_writer(1);
  assert_eq!(w.new_vertex().unwrap(), 0);
  assert_eq!(w.new_vertex().unwrap(), 1);
  assert!(w.ensure_vertex(64).is_err());
  assert!(w.put_edge(64, 0, Direction::Out, 1, &[]).is_err());
}

#[test]
fn test_tombstone_entry_bit() {
  let (_store, g) = graph(vec![0]);
  let w = g.create_graph_writer(1);
  w.put_edge(0, 0, Direction::Out, 3, &[]).unwrap();
  w.put_edge(0, 0, Direction::Out, TOMBSTONE_BIT, &[]).unwrap();
  assert_eq!(g.create_graph_reader(1).degree(0, 0, Direction::Out), 0);
}

proptest! {
  #[test]
  fn prop_tombstone_reconciliation(
    n in 1usize..120,
    picks in proptest::collection::vec(any::<prop::sample::Index>(), 0..120),
    interleave in any::<bool>(),
  ) {
    let (_store, g) = graph(vec![0]);
    let w = g.create_graph_writer(1);
    let mut live: Vec<u64> = Vec::new();
    let mut inserted = 0u64;
    let mut deleted = 0usize;

    if !interleave {
      for dst in 0..n as u64 {
        w.put_edge(0, 0, Direction::Out, dst, &[]).unwrap();
        live.push(dst);
      }
      inserted = n as u64;
    }
    for pick in &picks {
      if interleave && (inserted as usize) < n {
        w.put_edge(0, 0, Direction::Out, inserted, &[]).unwrap();
        live.push(inserted);
        inserted += 1;
      }
      if live.is_empty() {
        continue;
      }
      let dst = live.swap_remove(pick.index(live.len()));
      prop_assert!(w.delete_edge(0, 0, Direction::Out, dst).unwrap());
      deleted += 1;
    }
    while (inserted as usize) < n {
      w.put_edge(0, 0, Direction::Out, inserted, &[]).unwrap();
      live.push(inserted);
      inserted += 1;
    }

    live.sort_unstable();
    let seen = neighbors(g.create_graph_reader(1).outgoing(0, 0));
    prop_assert_eq!(seen.len(), n - deleted);
    prop_assert_eq!(seen, live);
  }
}
