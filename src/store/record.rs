//! Mutation records
//!
//! The log pipeline hands the store one pipe-separated line per mutation:
//!
//! ```text
//! add_vertex|epoch|gid|external_id|props...[|log_offset]
//! update_vertex|epoch|gid|external_id|props...[|log_offset]
//! delete_vertex|epoch|gid|external_id[|log_offset]
//! add_edge|epoch|elabel|src_gid|dst_gid|src_ext|dst_ext|props...[|log_offset]
//! update_edge|epoch|elabel|src_gid|dst_gid|src_ext|dst_ext|props...[|log_offset]
//! delete_edge|epoch|elabel|src_gid|dst_gid|src_ext|dst_ext[|log_offset]
//! bulkload_end|epoch[|log_offset]
//! ```
//!
//! Property values are text in schema order. An empty field is null. The
//! edge label may be given by id or by name.

use crate::constants::BULKLOAD_END_OP;
use crate::error::{GraphError, Result};
use crate::schema::SchemaLayout;
use crate::types::{DataType, Epoch, Gid, LabelId, PropValue};
use crate::util::codec::parse_value;
use crate::util::id_parser::IdParser;

#[derive(Debug, Clone, PartialEq)]
pub struct VertexRecord {
  pub epoch: Epoch,
  pub gid: Gid,
  pub external_id: i64,
  /// Empty for deletions
  pub props: Vec<Option<PropValue>>,
  pub log_offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRecord {
  pub epoch: Epoch,
  pub label: LabelId,
  pub src: Gid,
  pub dst: Gid,
  pub src_external_id: i64,
  pub dst_external_id: i64,
  /// Empty for deletions
  pub props: Vec<Option<PropValue>>,
  pub log_offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationRecord {
  AddVertex(VertexRecord),
  UpdateVertex(VertexRecord),
  DeleteVertex(VertexRecord),
  AddEdge(EdgeRecord),
  UpdateEdge(EdgeRecord),
  DeleteEdge(EdgeRecord),
  /// Closes the bulk-load epoch
  BulkLoadEnd { epoch: Epoch, log_offset: Option<u64> },
}

impl MutationRecord {
  pub fn epoch(&self) -> Epoch {
    match self {
      MutationRecord::AddVertex(v)
      | MutationRecord::UpdateVertex(v)
      | MutationRecord::DeleteVertex(v) => v.epoch,
      MutationRecord::AddEdge(e) | MutationRecord::UpdateEdge(e) | MutationRecord::DeleteEdge(e) => {
        e.epoch
      }
      MutationRecord::BulkLoadEnd { epoch, .. } => *epoch,
    }
  }

  pub fn log_offset(&self) -> Option<u64> {
    match self {
      MutationRecord::AddVertex(v)
      | MutationRecord::UpdateVertex(v)
      | MutationRecord::DeleteVertex(v) => v.log_offset,
      MutationRecord::AddEdge(e) | MutationRecord::UpdateEdge(e) | MutationRecord::DeleteEdge(e) => {
        e.log_offset
      }
      MutationRecord::BulkLoadEnd { log_offset, .. } => *log_offset,
    }
  }

  /// Operation name as it appears in the log
  pub fn op(&self) -> &'static str {
    match self {
      MutationRecord::AddVertex(_) => "add_vertex",
      MutationRecord::UpdateVertex(_) => "update_vertex",
      MutationRecord::DeleteVertex(_) => "delete_vertex",
      MutationRecord::AddEdge(_) => "add_edge",
      MutationRecord::UpdateEdge(_) => "update_edge",
      MutationRecord::DeleteEdge(_) => "delete_edge",
      MutationRecord::BulkLoadEnd { .. } => BULKLOAD_END_OP,
    }
  }

  /// Parse one log line against the resolved schema
  pub fn parse(line: &str, schema: &SchemaLayout, parser: &IdParser) -> Result<Self> {
    let line = line.trim_end_matches(['\r', '\n']);
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() < 2 {
      return Err(GraphError::malformed(format!("too few fields in {line:?}")));
    }
    let op = fields[0].trim();
    let epoch: Epoch = int_field(fields[1], "epoch")?;
    let rest = &fields[2..];

    match op {
      "add_vertex" | "update_vertex" | "delete_vertex" => {
        let [gid, external_id, tail @ ..] = rest else {
          return Err(GraphError::malformed(format!("{op} needs gid and external id")));
        };
        let gid: Gid = int_field(gid, "gid")?;
        let label = parser.get_label_id(gid);
        let vertex = schema
          .vertex_labels
          .get(label as usize)
          .ok_or_else(|| GraphError::malformed(format!("gid {gid} has unknown label {label}")))?;
        let dtypes: Vec<DataType> = if op == "delete_vertex" {
          Vec::new()
        } else {
          (0..vertex.props.prop_num() as u32)
            .filter_map(|p| vertex.props.dtype(p))
            .collect()
        };
        let (props, log_offset) = split_props(tail, &dtypes, op)?;
        let record = VertexRecord {
          epoch,
          gid,
          external_id: int_field(external_id, "external id")?,
          props,
          log_offset,
        };
        Ok(match op {
          "add_vertex" => MutationRecord::AddVertex(record),
          "update_vertex" => MutationRecord::UpdateVertex(record),
          _ => MutationRecord::DeleteVertex(record),
        })
      }
      "add_edge" | "update_edge" | "delete_edge" => {
        let [label, src, dst, src_ext, dst_ext, tail @ ..] = rest else {
          return Err(GraphError::malformed(format!(
            "{op} needs label, endpoints and external ids"
          )));
        };
        let label = edge_label(label.trim(), schema)?;
        let edge = &schema.edge_labels[label as usize];
        let src: Gid = int_field(src, "src gid")?;
        let dst: Gid = int_field(dst, "dst gid")?;
        if parser.get_label_id(src) != edge.src_label || parser.get_label_id(dst) != edge.dst_label
        {
          return Err(GraphError::malformed(format!(
            "{op} endpoints {src}->{dst} do not match edge label {}",
            edge.name
          )));
        }
        let dtypes = if op == "delete_edge" {
          Vec::new()
        } else {
          edge.props.dtypes.clone()
        };
        let (props, log_offset) = split_props(tail, &dtypes, op)?;
        let record = EdgeRecord {
          epoch,
          label,
          src,
          dst,
          src_external_id: int_field(src_ext, "src external id")?,
          dst_external_id: int_field(dst_ext, "dst external id")?,
          props,
          log_offset,
        };
        Ok(match op {
          "add_edge" => MutationRecord::AddEdge(record),
          "update_edge" => MutationRecord::UpdateEdge(record),
          _ => MutationRecord::DeleteEdge(record),
        })
      }
      BULKLOAD_END_OP => {
        let log_offset = match rest {
          [] => None,
          [offset] => Some(int_field(offset, "log offset")?),
          _ => return Err(GraphError::malformed("bulkload_end takes at most a log offset")),
        };
        Ok(MutationRecord::BulkLoadEnd { epoch, log_offset })
      }
      other => Err(GraphError::malformed(format!("unknown operation {other:?}"))),
    }
  }
}

fn int_field<T: std::str::FromStr>(text: &str, what: &str) -> Result<T> {
  text
    .trim()
    .parse()
    .map_err(|_| GraphError::malformed(format!("bad {what} {text:?}")))
}

fn edge_label(text: &str, schema: &SchemaLayout) -> Result<LabelId> {
  let label = match text.parse::<LabelId>() {
    Ok(id) => id,
    Err(_) => schema
      .edge_label_id(text)
      .ok_or_else(|| GraphError::malformed(format!("unknown edge label {text:?}")))?,
  };
  if label as usize >= schema.edge_label_num() {
    return Err(GraphError::malformed(format!("edge label {label} out of range")));
  }
  Ok(label)
}

/// Split trailing fields into typed properties and an optional log offset
fn split_props(
  tail: &[&str],
  dtypes: &[DataType],
  op: &str,
) -> Result<(Vec<Option<PropValue>>, Option<u64>)> {
  let n = dtypes.len();
  let log_offset = match tail.len() {
    len if len == n => None,
    len if len == n + 1 => Some(int_field(tail[n], "log offset")?),
    len => {
      return Err(GraphError::malformed(format!(
        "{op} expects {n} properties, got {len} fields"
      )))
    }
  };
  let props = dtypes
    .iter()
    .zip(tail)
    .map(|(&dtype, text)| parse_value(dtype, text))
    .collect::<Result<Vec<_>>>()?;
  Ok((props, log_offset))
}
