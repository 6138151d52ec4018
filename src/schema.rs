//! Graph schema
//!
//! The schema names vertex and edge labels, their properties and, for vertex
//! labels, how properties are grouped into column families. Label and
//! property ids are positions in declaration order.
//!
//! ```json
//! {
//!   "vertex_labels": [
//!     { "name": "person",
//!       "properties": [ { "name": "name", "data_type": "STRING" },
//!                       { "name": "age", "data_type": "INT", "column_family": 1 } ],
//!       "column_families": [ { "updatable": false }, { "updatable": true } ] }
//!   ],
//!   "edge_labels": [
//!     { "name": "knows", "src_label": "person", "dst_label": "person",
//!       "properties": [ { "name": "since", "data_type": "DATE" } ] }
//!   ]
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::constants::MAX_VERTEX_LABELS;
use crate::error::{GraphError, Result};
use crate::property::{EdgePropLayout, FamilyLayout, PropSlot, PropertyLayout};
use crate::types::{DataType, LabelId, PropId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
  pub name: String,
  pub data_type: DataType,
  /// Index into the label's column families
  #[serde(default)]
  pub column_family: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFamilyDef {
  #[serde(default = "default_updatable")]
  pub updatable: bool,
  /// Overrides `StoreConfig::rows_per_page`
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rows_per_page: Option<u64>,
}

fn default_updatable() -> bool {
  true
}

impl Default for ColumnFamilyDef {
  fn default() -> Self {
    Self {
      updatable: true,
      rows_per_page: None,
    }
  }
}

fn default_families() -> Vec<ColumnFamilyDef> {
  vec![ColumnFamilyDef::default()]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexLabelDef {
  pub name: String,
  /// Source table the label is loaded from, informational
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub table: Option<String>,
  #[serde(default)]
  pub properties: Vec<PropertyDef>,
  #[serde(default = "default_families")]
  pub column_families: Vec<ColumnFamilyDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeLabelDef {
  pub name: String,
  pub src_label: String,
  pub dst_label: String,
  #[serde(default)]
  pub properties: Vec<PropertyDef>,
}

/// Declared schema, as published under the schema metadata key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSchema {
  pub vertex_labels: Vec<VertexLabelDef>,
  #[serde(default)]
  pub edge_labels: Vec<EdgeLabelDef>,
}

impl GraphSchema {
  pub fn from_json_str(json: &str) -> Result<Self> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string(self)?)
  }

  /// Validate the schema and compute the physical layouts
  pub fn resolve(&self, config: &StoreConfig) -> Result<SchemaLayout> {
    if self.vertex_labels.is_empty() {
      return Err(GraphError::Schema("no vertex labels".to_string()));
    }
    if self.vertex_labels.len() > MAX_VERTEX_LABELS {
      return Err(GraphError::Schema(format!(
        "{} vertex labels exceed the limit of {MAX_VERTEX_LABELS}",
        self.vertex_labels.len()
      )));
    }

    let mut vertex_ids: IndexMap<String, LabelId> = IndexMap::new();
    let mut vertex_labels = Vec::with_capacity(self.vertex_labels.len());
    for (id, def) in self.vertex_labels.iter().enumerate() {
      if vertex_ids.insert(def.name.clone(), id as LabelId).is_some() {
        return Err(GraphError::Schema(format!(
          "duplicate vertex label {}",
          def.name
        )));
      }
      vertex_labels.push(resolve_vertex_label(def, config)?);
    }

    let mut edge_ids: IndexMap<String, LabelId> = IndexMap::new();
    let mut edge_labels = Vec::with_capacity(self.edge_labels.len());
    for (id, def) in self.edge_labels.iter().enumerate() {
      if edge_ids.insert(def.name.clone(), id as LabelId).is_some() {
        return Err(GraphError::Schema(format!("duplicate edge label {}", def.name)));
      }
      let endpoint = |name: &str| {
        vertex_ids.get(name).copied().ok_or_else(|| {
          GraphError::Schema(format!(
            "edge label {} references unknown vertex label {name}",
            def.name
          ))
        })
      };
      let props = property_names(&def.properties, &def.name)?;
      edge_labels.push(EdgeLabelLayout {
        name: def.name.clone(),
        src_label: endpoint(&def.src_label)?,
        dst_label: endpoint(&def.dst_label)?,
        props: EdgePropLayout::new(def.properties.iter().map(|p| p.data_type).collect()),
        prop_names: props,
      });
    }

    Ok(SchemaLayout {
      vertex_ids,
      edge_ids,
      vertex_labels,
      edge_labels,
    })
  }
}

fn property_names(props: &[PropertyDef], owner: &str) -> Result<IndexMap<String, PropId>> {
  let mut names = IndexMap::with_capacity(props.len());
  for (id, prop) in props.iter().enumerate() {
    if names.insert(prop.name.clone(), id as PropId).is_some() {
      return Err(GraphError::Schema(format!(
        "duplicate property {} on {owner}",
        prop.name
      )));
    }
  }
  Ok(names)
}

fn resolve_vertex_label(def: &VertexLabelDef, config: &StoreConfig) -> Result<VertexLabelLayout> {
  let families = if def.column_families.is_empty() {
    default_families()
  } else {
    def.column_families.clone()
  };
  let mut members: Vec<Vec<(PropId, DataType)>> = vec![Vec::new(); families.len()];
  let mut slots = Vec::with_capacity(def.properties.len());
  for (id, prop) in def.properties.iter().enumerate() {
    let family = members.get_mut(prop.column_family).ok_or_else(|| {
      GraphError::Schema(format!(
        "property {} of {} names column family {} of {}",
        prop.name,
        def.name,
        prop.column_family,
        families.len()
      ))
    })?;
    slots.push(PropSlot {
      family: prop.column_family,
      column: family.len(),
    });
    family.push((id as PropId, prop.data_type));
  }

  let families = families
    .iter()
    .zip(&members)
    .map(|(family, columns)| {
      let rows_per_page = family.rows_per_page.unwrap_or(config.rows_per_page);
      if rows_per_page == 0 {
        return Err(GraphError::Schema(format!(
          "column family of {} has zero rows per page",
          def.name
        )));
      }
      Ok(FamilyLayout::new(family.updatable, rows_per_page, columns))
    })
    .collect::<Result<Vec<_>>>()?;

  Ok(VertexLabelLayout {
    name: def.name.clone(),
    props: PropertyLayout { families, slots },
    prop_names: property_names(&def.properties, &def.name)?,
  })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLabelLayout {
  pub name: String,
  pub props: PropertyLayout,
  pub prop_names: IndexMap<String, PropId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeLabelLayout {
  pub name: String,
  pub src_label: LabelId,
  pub dst_label: LabelId,
  pub props: EdgePropLayout,
  pub prop_names: IndexMap<String, PropId>,
}

/// Resolved schema: ids, property layouts and edge endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaLayout {
  vertex_ids: IndexMap<String, LabelId>,
  edge_ids: IndexMap<String, LabelId>,
  pub vertex_labels: Vec<VertexLabelLayout>,
  pub edge_labels: Vec<EdgeLabelLayout>,
}

impl SchemaLayout {
  pub fn vertex_label_num(&self) -> usize {
    self.vertex_labels.len()
  }

  pub fn edge_label_num(&self) -> usize {
    self.edge_labels.len()
  }

  pub fn vertex_label_id(&self, name: &str) -> Option<LabelId> {
    self.vertex_ids.get(name).copied()
  }

  pub fn edge_label_id(&self, name: &str) -> Option<LabelId> {
    self.edge_ids.get(name).copied()
  }

  pub fn vertex_prop_id(&self, label: LabelId, name: &str) -> Option<PropId> {
    self.vertex_labels.get(label as usize)?.prop_names.get(name).copied()
  }

  pub fn edge_prop_id(&self, label: LabelId, name: &str) -> Option<PropId> {
    self.edge_labels.get(label as usize)?.prop_names.get(name).copied()
  }

  /// Edge property bytes per edge label, as stored in edge blocks
  pub fn edge_prop_bytes(&self) -> Vec<u64> {
    self.edge_labels.iter().map(|e| e.props.total_bytes).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SCHEMA: &str = r#"{
    "vertex_labels": [
      { "name": "person",
        "properties": [
          { "name": "name", "data_type": "STRING" },
          { "name": "age", "data_type": "INT", "column_family": 1 },
          { "name": "born", "data_type": "DATE" }
        ],
        "column_families": [ { "updatable": false }, { "updatable": true, "rows_per_page": 16 } ] },
      { "name": "city", "properties": [ { "name": "name", "data_type": "STRING" } ] }
    ],
    "edge_labels": [
      { "name": "knows", "src_label": "person", "dst_label": "person",
        "properties": [ { "name": "since", "data_type": "LONG" } ] },
      { "name": "lives_in", "src_label": "person", "dst_label": "city" }
    ]
  }"#;

  #[test]
  fn test_resolve_layouts() {
    let schema = GraphSchema::from_json_str(SCHEMA).unwrap();
    let layout = schema.resolve(&StoreConfig::default()).unwrap();

    assert_eq!(layout.vertex_label_num(), 2);
    assert_eq!(layout.vertex_label_id("city"), Some(1));
    assert_eq!(layout.edge_label_id("lives_in"), Some(1));
    assert_eq!(layout.edge_labels[1].dst_label, 1);
    assert_eq!(layout.vertex_prop_id(0, "born"), Some(2));

    let person = &layout.vertex_labels[0].props;
    assert_eq!(person.families.len(), 2);
    assert!(!person.families[0].updatable);
    assert_eq!(person.families[1].rows_per_page, 16);
    assert_eq!(person.slots[2], PropSlot { family: 0, column: 1 });
    assert_eq!(person.dtype(1), Some(DataType::Int));

    let city = &layout.vertex_labels[1].props;
    assert_eq!(city.families.len(), 1);
    assert!(city.families[0].updatable);
    assert_eq!(
      city.families[0].rows_per_page,
      StoreConfig::default().rows_per_page
    );
    assert_eq!(layout.edge_prop_bytes(), vec![9, 0]);
  }

  #[test]
  fn test_schema_json_round_trip() {
    let schema = GraphSchema::from_json_str(SCHEMA).unwrap();
    let again = GraphSchema::from_json_str(&schema.to_json().unwrap()).unwrap();
    assert_eq!(schema, again);
  }

  #[test]
  fn test_rejects_unknown_endpoint() {
    let schema = GraphSchema::from_json_str(
      r#"{ "vertex_labels": [ { "name": "a" } ],
           "edge_labels": [ { "name": "e", "src_label": "a", "dst_label": "b" } ] }"#,
    )
    .unwrap();
    assert!(matches!(
      schema.resolve(&StoreConfig::default()),
      Err(GraphError::Schema(_))
    ));
  }

  #[test]
  fn test_rejects_bad_family_and_duplicates() {
    let bad_family = GraphSchema::from_json_str(
      r#"{ "vertex_labels": [ { "name": "a",
           "properties": [ { "name": "x", "data_type": "INT", "column_family": 3 } ] } ] }"#,
    )
    .unwrap();
    assert!(bad_family.resolve(&StoreConfig::default()).is_err());

    let duplicate = GraphSchema::from_json_str(
      r#"{ "vertex_labels": [ { "name": "a" }, { "name": "a" } ] }"#,
    )
    .unwrap();
    assert!(duplicate.resolve(&StoreConfig::default()).is_err());
  }

  #[test]
  fn test_label_limit() {
    let schema = GraphSchema {
      vertex_labels: (0..=MAX_VERTEX_LABELS)
        .map(|i| VertexLabelDef {
          name: format!("v{i}"),
          table: None,
          properties: Vec::new(),
          column_families: default_families(),
        })
        .collect(),
      edge_labels: Vec::new(),
    };
    assert!(schema.resolve(&StoreConfig::default()).is_err());
  }

  #[test]
  fn test_unknown_data_type_is_rejected() {
    let err = GraphSchema::from_json_str(
      r#"{ "vertex_labels": [ { "name": "a",
           "properties": [ { "name": "x", "data_type": "BLOB" } ] } ] }"#,
    );
    assert!(err.is_err());
  }
}
