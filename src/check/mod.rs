//! Fragment integrity checks
//!
//! Walks one published fragment and verifies the invariants readers rely
//! on. Nothing here mutates shared state, so a check can run alongside the
//! writer against any published epoch.

use crate::fragment::{Fragment, GraphView};
use crate::types::{Direction, LabelId, Vertex};

/// Outcome of a check run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResult {
  pub valid: bool,
  pub errors: Vec<String>,
  pub warnings: Vec<String>,
}

/// Check all fragment invariants
pub fn check_fragment(fragment: &Fragment) -> CheckResult {
  let mut errors = Vec::new();
  let mut warnings = Vec::new();

  for label in 0..fragment.vertex_label_num() as LabelId {
    check_vertex_frontiers(fragment, label, &mut errors);
    check_vertex_counts(fragment, label, &mut errors);
  }

  let (out_total, in_total) = check_adjacency(fragment, &mut errors, &mut warnings);
  if out_total != in_total {
    errors.push(format!(
      "{out_total} outgoing entries but {in_total} incoming entries"
    ));
  }
  if out_total != fragment.edge_num() {
    errors.push(format!(
      "metadata claims {} edges, adjacency holds {out_total}",
      fragment.edge_num()
    ));
  }

  CheckResult {
    valid: errors.is_empty(),
    errors,
    warnings,
  }
}

fn check_vertex_frontiers(fragment: &Fragment, label: LabelId, errors: &mut Vec<String>) {
  let meta = fragment.vertex_table(label).meta();
  if meta.max_inner_location > meta.min_outer_location {
    errors.push(format!(
      "label {label}: inner frontier {} crosses outer frontier {}",
      meta.max_inner_location, meta.min_outer_location
    ));
  }
  if meta.min_outer_location > meta.capacity {
    errors.push(format!(
      "label {label}: outer frontier {} beyond capacity {}",
      meta.min_outer_location, meta.capacity
    ));
  }
  if meta.inner_offset_bound > meta.capacity {
    errors.push(format!(
      "label {label}: inner offsets reach {} beyond capacity {}",
      meta.inner_offset_bound, meta.capacity
    ));
  }
}

fn check_vertex_counts(fragment: &Fragment, label: LabelId, errors: &mut Vec<String>) {
  let inner = fragment.inner_vertices(label).count() as u64;
  if inner != fragment.inner_vertex_num(label) {
    errors.push(format!(
      "label {label}: {inner} live inner vertices, metadata says {}",
      fragment.inner_vertex_num(label)
    ));
  }
  let outer = fragment.outer_vertices(label).count() as u64;
  if outer != fragment.outer_vertex_num(label) {
    errors.push(format!(
      "label {label}: {outer} live mirrors, metadata says {}",
      fragment.outer_vertex_num(label)
    ));
  }
}

/// Whether `v` names a slot the fragment's frontiers cover
fn in_bounds(fragment: &Fragment, v: Vertex) -> bool {
  let parser = fragment.id_parser();
  let label = parser.get_label_id(v.lid());
  if label as usize >= fragment.vertex_label_num() {
    return false;
  }
  let meta = fragment.vertex_table(label).meta();
  let offset = parser.get_offset(v.lid());
  if fragment.is_inner(v) {
    offset < meta.inner_offset_bound
  } else {
    parser.mirror_offset(offset) < meta.outer_num
  }
}

/// Walk every adjacency list. Returns total (outgoing, incoming) entries.
fn check_adjacency(
  fragment: &Fragment,
  errors: &mut Vec<String>,
  warnings: &mut Vec<String>,
) -> (u64, u64) {
  let schema = fragment.schema();
  let mut totals = (0u64, 0u64);
  for label in 0..fragment.vertex_label_num() as LabelId {
    for v in fragment.vertices(label) {
      for (elabel, edge) in schema.edge_labels.iter().enumerate() {
        let elabel = elabel as LabelId;
        for dir in Direction::ALL {
          let (mine, theirs) = match dir {
            Direction::Out => (edge.src_label, edge.dst_label),
            Direction::In => (edge.dst_label, edge.src_label),
          };
          let epochs = fragment.checkpoint_epochs(v, elabel, dir);
          if epochs.windows(2).any(|w| w[0] >= w[1]) {
            errors.push(format!(
              "vertex {}: epoch table of edge label {elabel} {dir:?} not increasing: {epochs:?}",
              v.lid()
            ));
          }

          let adjacency = match dir {
            Direction::Out => fragment.outgoing(v, elabel),
            Direction::In => fragment.incoming(v, elabel),
          };
          let mut count = 0u64;
          for e in adjacency {
            count += 1;
            let n = e.neighbor();
            if !in_bounds(fragment, n) {
              errors.push(format!(
                "vertex {}: edge label {elabel} {dir:?} neighbor {} out of bounds",
                v.lid(),
                n.lid()
              ));
            } else if fragment.vertex_label(n) != theirs {
              errors.push(format!(
                "vertex {}: edge label {elabel} {dir:?} neighbor {} has label {}, expected {theirs}",
                v.lid(),
                n.lid(),
                fragment.vertex_label(n)
              ));
            }
            if fragment.is_outer(v) && fragment.is_outer(n) {
              warnings.push(format!(
                "edge label {elabel}: mirrors {} and {} share an edge",
                v.lid(),
                n.lid()
              ));
            }
          }
          if count > 0 && label != mine {
            errors.push(format!(
              "vertex {} of label {label} holds {count} {dir:?} edges of label {elabel}",
              v.lid()
            ));
          }
          match dir {
            Direction::Out => totals.0 += count,
            Direction::In => totals.1 += count,
          }
        }
      }
    }
  }
  totals
}
