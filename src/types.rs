//! Core type definitions shared by the writer and reader sides

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

// ============================================================================
// Identifiers
// ============================================================================

/// Logical timestamp of a consistent cut of applied mutations
pub type Epoch = u64;

/// Global vertex id: fid | label | offset packed by `IdParser`
pub type Gid = u64;

/// Partition-local vertex id: label | offset with the fid bits cleared
pub type Lid = u64;

/// Vertex or edge label index
pub type LabelId = u32;

/// Property index within one label
pub type PropId = u32;

/// Opaque shared-memory blob handle
pub type BlobId = u64;

/// Byte offset into an arena. Zero is never handed out.
pub type ArenaOffset = u64;

/// Offset value meaning "nothing here"
pub const NULL_OFFSET: ArenaOffset = 0;

/// Vertex handle returned by fragment iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vertex(pub Lid);

impl Vertex {
  #[inline]
  pub fn lid(self) -> Lid {
    self.0
  }
}

// ============================================================================
// Direction
// ============================================================================

/// Adjacency direction of an edge list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
  Out,
  In,
}

impl Direction {
  pub const ALL: [Direction; 2] = [Direction::Out, Direction::In];

  #[inline]
  pub fn index(self) -> usize {
    match self {
      Direction::Out => 0,
      Direction::In => 1,
    }
  }

  #[inline]
  pub fn reverse(self) -> Self {
    match self {
      Direction::Out => Direction::In,
      Direction::In => Direction::Out,
    }
  }
}

// ============================================================================
// Property data types
// ============================================================================

/// Property data type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
  Int,
  Long,
  Float,
  Double,
  String,
  Char,
  /// Days since 1970-01-01
  Date,
  /// Milliseconds since 1970-01-01T00:00:00Z
  DateTime,
  /// Milliseconds since midnight
  Time,
  /// Milliseconds since 1970-01-01T00:00:00Z
  Timestamp,
}

impl DataType {
  /// Fixed byte width of one cell. Strings store an 8-byte surrogate.
  pub fn width(self) -> usize {
    match self {
      DataType::Int | DataType::Float | DataType::Date | DataType::Time => 4,
      DataType::Long
      | DataType::Double
      | DataType::String
      | DataType::DateTime
      | DataType::Timestamp => 8,
      DataType::Char => 1,
    }
  }
}

impl FromStr for DataType {
  type Err = GraphError;

  fn from_str(s: &str) -> Result<Self> {
    let dtype = match s.to_ascii_uppercase().as_str() {
      "INT" | "INTEGER" | "INT32" => DataType::Int,
      "LONG" | "BIGINT" | "INT64" => DataType::Long,
      "FLOAT" => DataType::Float,
      "DOUBLE" => DataType::Double,
      "STRING" | "VARCHAR" | "TEXT" => DataType::String,
      "CHAR" => DataType::Char,
      "DATE" => DataType::Date,
      "DATETIME" => DataType::DateTime,
      "TIME" => DataType::Time,
      "TIMESTAMP" => DataType::Timestamp,
      _ => return Err(GraphError::UnknownDataType(s.to_string())),
    };
    Ok(dtype)
  }
}

impl fmt::Display for DataType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      DataType::Int => "INT",
      DataType::Long => "LONG",
      DataType::Float => "FLOAT",
      DataType::Double => "DOUBLE",
      DataType::String => "STRING",
      DataType::Char => "CHAR",
      DataType::Date => "DATE",
      DataType::DateTime => "DATETIME",
      DataType::Time => "TIME",
      DataType::Timestamp => "TIMESTAMP",
    };
    f.write_str(name)
  }
}

/// A decoded property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
  Int(i32),
  Long(i64),
  Float(f32),
  Double(f64),
  String(String),
  Char(u8),
  Date(i32),
  DateTime(i64),
  Time(i32),
  Timestamp(i64),
}

impl PropValue {
  pub fn data_type(&self) -> DataType {
    match self {
      PropValue::Int(_) => DataType::Int,
      PropValue::Long(_) => DataType::Long,
      PropValue::Float(_) => DataType::Float,
      PropValue::Double(_) => DataType::Double,
      PropValue::String(_) => DataType::String,
      PropValue::Char(_) => DataType::Char,
      PropValue::Date(_) => DataType::Date,
      PropValue::DateTime(_) => DataType::DateTime,
      PropValue::Time(_) => DataType::Time,
      PropValue::Timestamp(_) => DataType::Timestamp,
    }
  }
}

/// Conversion from a decoded property value into a concrete Rust type
pub trait FromPropValue: Sized {
  fn from_prop_value(value: PropValue) -> Option<Self>;
}

impl FromPropValue for PropValue {
  fn from_prop_value(value: PropValue) -> Option<Self> {
    Some(value)
  }
}

impl FromPropValue for i32 {
  fn from_prop_value(value: PropValue) -> Option<Self> {
    match value {
      PropValue::Int(v) | PropValue::Date(v) | PropValue::Time(v) => Some(v),
      _ => None,
    }
  }
}

impl FromPropValue for i64 {
  fn from_prop_value(value: PropValue) -> Option<Self> {
    match value {
      PropValue::Int(v) | PropValue::Date(v) | PropValue::Time(v) => Some(v as i64),
      PropValue::Long(v) | PropValue::DateTime(v) | PropValue::Timestamp(v) => Some(v),
      _ => None,
    }
  }
}

impl FromPropValue for f32 {
  fn from_prop_value(value: PropValue) -> Option<Self> {
    match value {
      PropValue::Float(v) => Some(v),
      _ => None,
    }
  }
}

impl FromPropValue for f64 {
  fn from_prop_value(value: PropValue) -> Option<Self> {
    match value {
      PropValue::Float(v) => Some(v as f64),
      PropValue::Double(v) => Some(v),
      _ => None,
    }
  }
}

impl FromPropValue for u8 {
  fn from_prop_value(value: PropValue) -> Option<Self> {
    match value {
      PropValue::Char(v) => Some(v),
      _ => None,
    }
  }
}

impl FromPropValue for String {
  fn from_prop_value(value: PropValue) -> Option<Self> {
    match value {
      PropValue::String(v) => Some(v),
      _ => None,
    }
  }
}
