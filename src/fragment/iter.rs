//! Fragment iterators

use crate::core::string_buffer::StringBufferView;
use crate::core::vertex_table::{InnerSlots, OuterSlots};
use crate::property::EdgePropLayout;
use crate::seggraph::{EdgeEntry, EdgeIter};
use crate::types::{FromPropValue, LabelId, PropId, PropValue, Vertex};
use crate::util::id_parser::IdParser;

/// Live vertices of one label: inner ones newest first, then mirrors
#[derive(Debug)]
pub struct VertexIter<'a> {
  parser: &'a IdParser,
  label: LabelId,
  inner: Option<InnerSlots<'a>>,
  outer: Option<OuterSlots<'a>>,
}

impl<'a> VertexIter<'a> {
  pub(crate) fn new(
    parser: &'a IdParser,
    label: LabelId,
    inner: Option<InnerSlots<'a>>,
    outer: Option<OuterSlots<'a>>,
  ) -> Self {
    Self {
      parser,
      label,
      inner,
      outer,
    }
  }
}

impl Iterator for VertexIter<'_> {
  type Item = Vertex;

  fn next(&mut self) -> Option<Vertex> {
    if let Some(inner) = self.inner.as_mut() {
      match inner.next() {
        Some(offset) => return Some(Vertex(self.parser.generate_lid(self.label, offset))),
        None => self.inner = None,
      }
    }
    let ov = self.outer.as_mut()?.next()?;
    Some(Vertex(
      self.parser.generate_lid(self.label, self.parser.mirror_offset(ov)),
    ))
  }
}

/// One edge seen from the vertex whose list is being walked
#[derive(Debug, Clone)]
pub struct EdgeRef<'a> {
  entry: EdgeEntry<'a>,
  layout: &'a EdgePropLayout,
  strings: &'a StringBufferView,
}

impl EdgeRef<'_> {
  /// The other endpoint
  #[inline]
  pub fn neighbor(&self) -> Vertex {
    Vertex(self.entry.neighbor())
  }

  /// Property `prop` of the edge; `None` when null or unknown
  pub fn get_value(&self, prop: PropId) -> Option<PropValue> {
    if prop as usize >= self.layout.prop_num() {
      return None;
    }
    let record = self.entry.props(self.layout.total_bytes as usize);
    self.layout.decode(&record, prop, self.strings)
  }

  pub fn get_data<T: FromPropValue>(&self, prop: PropId) -> Option<T> {
    self.get_value(prop).and_then(T::from_prop_value)
  }
}

/// Adjacency list of one vertex for one edge label, newest edge first
pub struct AdjIter<'a> {
  entries: EdgeIter<'a>,
  layout: &'a EdgePropLayout,
  strings: &'a StringBufferView,
}

impl std::fmt::Debug for AdjIter<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AdjIter")
      .field("props", &self.layout.prop_num())
      .finish()
  }
}

impl<'a> AdjIter<'a> {
  pub(crate) fn new(
    entries: EdgeIter<'a>,
    layout: &'a EdgePropLayout,
    strings: &'a StringBufferView,
  ) -> Self {
    Self {
      entries,
      layout,
      strings,
    }
  }
}

impl<'a> Iterator for AdjIter<'a> {
  type Item = EdgeRef<'a>;

  fn next(&mut self) -> Option<EdgeRef<'a>> {
    let entry = self.entries.next()?;
    Some(EdgeRef {
      entry,
      layout: self.layout,
      strings: self.strings,
    })
  }
}
