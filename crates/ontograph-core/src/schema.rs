//! Schema types: versioned node and edge type definitions.
//!
//! A [`Schema`] row is immutable apart from its `is_active` flag. Changing a
//! type means appending a new row whose version is derived from
//! [`classify_change`]; nodes and edges keep pointing at the row they were
//! created under.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  Error, Result,
  version::{SemVer, VersionBump},
};

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// Whether a schema types vertices or relationships.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum SchemaKind {
  Node,
  Edge,
}

// ─── Attributes ──────────────────────────────────────────────────────────────

/// The value type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
  String,
  Int,
  Float,
  Bool,
  /// A string restricted to the listed variants.
  Enum(Vec<String>),
  /// A calendar date, `YYYY-MM-DD`.
  Date,
  /// An RFC 3339 timestamp.
  Datetime,
  /// Any semi-structured value.
  Json,
}

impl DataType {
  pub fn name(&self) -> &'static str {
    match self {
      Self::String => "string",
      Self::Int => "int",
      Self::Float => "float",
      Self::Bool => "bool",
      Self::Enum(_) => "enum",
      Self::Date => "date",
      Self::Datetime => "datetime",
      Self::Json => "json",
    }
  }
}

/// One attribute of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
  pub name:        String,
  pub data_type:   DataType,
  #[serde(default)]
  pub required:    bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default:     Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl AttributeDefinition {
  pub fn required(name: impl Into<String>, data_type: DataType) -> Self {
    Self { name: name.into(), data_type, required: true, default: None, description: None }
  }

  pub fn optional(name: impl Into<String>, data_type: DataType) -> Self {
    Self { required: false, ..Self::required(name, data_type) }
  }

  pub fn with_default(mut self, default: Value) -> Self {
    self.default = Some(default);
    self
  }
}

// ─── Vector & chunking configuration ─────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VectorPrecision {
  #[default]
  F32,
  F16,
  Int8,
}

/// How embeddings for instances of this type are produced and stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorConfig {
  pub dimension:       u32,
  #[serde(default)]
  pub precision:       VectorPrecision,
  pub embedding_model: String,
}

/// Chunking parameters for unstructured content attached to this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstructuredConfig {
  pub chunk_size:    usize,
  pub chunk_overlap: usize,
}

impl Default for UnstructuredConfig {
  fn default() -> Self { Self { chunk_size: 1000, chunk_overlap: 200 } }
}

/// Source and target node types of an edge schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEndpoints {
  pub from: String,
  pub to:   String,
}

// ─── Definition ──────────────────────────────────────────────────────────────

/// The caller-controlled part of a schema: everything except identity,
/// version, activity and timestamps. Input to schema creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
  pub name:                String,
  pub kind:                SchemaKind,
  #[serde(default)]
  pub attributes:          Vec<AttributeDefinition>,
  #[serde(default)]
  pub vector_config:       Option<VectorConfig>,
  #[serde(default)]
  pub unstructured_config: Option<UnstructuredConfig>,
  #[serde(default)]
  pub endpoints:           Option<EdgeEndpoints>,
  /// Reject attributes that the schema does not declare.
  #[serde(default)]
  pub strict:              bool,
}

impl SchemaDefinition {
  /// An empty, non-strict definition.
  pub fn new(name: impl Into<String>, kind: SchemaKind) -> Self {
    Self {
      name: name.into(),
      kind,
      attributes: Vec::new(),
      vector_config: None,
      unstructured_config: None,
      endpoints: None,
      strict: false,
    }
  }

  pub fn node(name: impl Into<String>) -> Self { Self::new(name, SchemaKind::Node) }

  pub fn edge(name: impl Into<String>) -> Self { Self::new(name, SchemaKind::Edge) }

  pub fn with_attribute(mut self, attribute: AttributeDefinition) -> Self {
    self.attributes.push(attribute);
    self
  }

  pub fn with_vector_config(mut self, config: VectorConfig) -> Self {
    self.vector_config = Some(config);
    self
  }

  pub fn with_endpoints(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
    self.endpoints = Some(EdgeEndpoints { from: from.into(), to: to.into() });
    self
  }

  pub fn strict(mut self) -> Self {
    self.strict = true;
    self
  }

  pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
    self.attributes.iter().find(|a| a.name == name)
  }

  fn attribute_mut(&mut self, name: &str) -> Result<&mut AttributeDefinition> {
    let schema = self.name.clone();
    self
      .attributes
      .iter_mut()
      .find(|a| a.name == name)
      .ok_or_else(|| Error::UnknownAttribute { schema, attribute: name.to_owned() })
  }

  /// Apply an attribute edit in place.
  pub fn apply(&mut self, edit: &SchemaEdit) -> Result<()> {
    match edit {
      SchemaEdit::AddAttribute(attr) => {
        if self.attribute(&attr.name).is_some() {
          return Err(Error::DuplicateAttribute {
            schema:    self.name.clone(),
            attribute: attr.name.clone(),
          });
        }
        self.attributes.push(attr.clone());
      }
      SchemaEdit::RemoveAttribute { name } => {
        self.attribute_mut(name)?;
        self.attributes.retain(|a| &a.name != name);
      }
      SchemaEdit::ChangeType { name, data_type } => {
        self.attribute_mut(name)?.data_type = data_type.clone();
      }
      SchemaEdit::SetRequired { name, required } => {
        self.attribute_mut(name)?.required = *required;
      }
      SchemaEdit::SetDefault { name, default } => {
        self.attribute_mut(name)?.default = default.clone();
      }
    }
    Ok(())
  }
}

/// A single attribute-level modification of an existing definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaEdit {
  AddAttribute(AttributeDefinition),
  RemoveAttribute { name: String },
  ChangeType { name: String, data_type: DataType },
  SetRequired { name: String, required: bool },
  SetDefault { name: String, default: Option<Value> },
}

/// Check a schema name (or an extracted type label) before it becomes one.
pub fn validate_schema_name(name: &str) -> Result<()> {
  let invalid = |reason| Err(Error::InvalidSchemaName { name: name.to_owned(), reason });
  if name.trim().is_empty() {
    return invalid("name is empty");
  }
  if name.trim() != name {
    return invalid("name has surrounding whitespace");
  }
  if name.chars().count() > 128 {
    return invalid("name is longer than 128 characters");
  }
  if name.chars().any(char::is_control) {
    return invalid("name contains control characters");
  }
  Ok(())
}

// ─── Change classification ───────────────────────────────────────────────────

/// Decide how far the version must move to go from `current` to `proposed`.
///
/// Returns [`Error::SchemaKindConflict`] when the kinds differ; a kind is fixed
/// for the lifetime of a schema name.
pub fn classify_change(
  current: &SchemaDefinition,
  proposed: &SchemaDefinition,
) -> Result<VersionBump> {
  if current.kind != proposed.kind {
    return Err(Error::SchemaKindConflict {
      name:      current.name.clone(),
      existing:  current.kind,
      requested: proposed.kind,
    });
  }

  let mut bump = VersionBump::None;
  let mut raise = |b: VersionBump| bump = bump.max(b);

  for old in &current.attributes {
    let Some(new) = proposed.attribute(&old.name) else {
      raise(VersionBump::Major);
      continue;
    };
    raise(classify_type_change(&old.data_type, &new.data_type));
    match (old.required, new.required) {
      (false, true) => raise(VersionBump::Major),
      (true, false) => raise(VersionBump::Minor),
      _ => {}
    }
    if old.default != new.default || old.description != new.description {
      raise(VersionBump::Patch);
    }
  }

  for new in &proposed.attributes {
    if current.attribute(&new.name).is_none() {
      raise(if new.required { VersionBump::Major } else { VersionBump::Minor });
    }
  }

  match (&current.vector_config, &proposed.vector_config) {
    (Some(a), Some(b)) if a.dimension != b.dimension => raise(VersionBump::Major),
    (a, b) if a != b => raise(VersionBump::Patch),
    _ => {}
  }

  if current.unstructured_config != proposed.unstructured_config
    || current.endpoints != proposed.endpoints
  {
    raise(VersionBump::Patch);
  }

  match (current.strict, proposed.strict) {
    (false, true) => raise(VersionBump::Major),
    (true, false) => raise(VersionBump::Patch),
    _ => {}
  }

  // A pure reordering of attributes is still a new definition.
  if bump == VersionBump::None && current.attributes != proposed.attributes {
    return Ok(VersionBump::Patch);
  }

  Ok(bump)
}

fn classify_type_change(old: &DataType, new: &DataType) -> VersionBump {
  match (old, new) {
    (a, b) if a == b => VersionBump::None,
    (DataType::Enum(old), DataType::Enum(new)) => {
      if old.iter().all(|v| new.contains(v)) {
        VersionBump::Minor
      } else {
        VersionBump::Major
      }
    }
    _ => VersionBump::Major,
  }
}

// ─── Schema ──────────────────────────────────────────────────────────────────

/// A persisted, versioned type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
  pub schema_id:           Uuid,
  pub project_id:          Uuid,
  pub schema_name:         String,
  pub kind:                SchemaKind,
  pub version:             SemVer,
  pub is_active:           bool,
  pub strict:              bool,
  pub attributes:          Vec<AttributeDefinition>,
  pub vector_config:       Option<VectorConfig>,
  pub unstructured_config: Option<UnstructuredConfig>,
  pub endpoints:           Option<EdgeEndpoints>,
  pub created_at:          DateTime<Utc>,
}

impl Schema {
  /// Build a new, active schema row from a definition.
  pub fn from_definition(
    project_id: Uuid,
    definition: SchemaDefinition,
    version: SemVer,
  ) -> Self {
    Self {
      schema_id: Uuid::new_v4(),
      project_id,
      schema_name: definition.name,
      kind: definition.kind,
      version,
      is_active: true,
      strict: definition.strict,
      attributes: definition.attributes,
      vector_config: definition.vector_config,
      unstructured_config: definition.unstructured_config,
      endpoints: definition.endpoints,
      created_at: Utc::now(),
    }
  }

  pub fn definition(&self) -> SchemaDefinition {
    SchemaDefinition {
      name:                self.schema_name.clone(),
      kind:                self.kind,
      attributes:          self.attributes.clone(),
      vector_config:       self.vector_config.clone(),
      unstructured_config: self.unstructured_config,
      endpoints:           self.endpoints.clone(),
      strict:              self.strict,
    }
  }

  pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
    self.attributes.iter().find(|a| a.name == name)
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn person() -> SchemaDefinition {
    SchemaDefinition::node("Person").with_attribute(AttributeDefinition::required("name", DataType::String))
  }

  fn bump(current: &SchemaDefinition, edit: SchemaEdit) -> VersionBump {
    let mut proposed = current.clone();
    proposed.apply(&edit).unwrap();
    classify_change(current, &proposed).unwrap()
  }

  #[test]
  fn identical_definition_needs_no_bump() {
    assert_eq!(classify_change(&person(), &person()).unwrap(), VersionBump::None);
  }

  #[test]
  fn optional_attribute_is_minor() {
    let edit = SchemaEdit::AddAttribute(AttributeDefinition::optional("email", DataType::String));
    assert_eq!(bump(&person(), edit), VersionBump::Minor);
  }

  #[test]
  fn required_attribute_is_major() {
    let edit = SchemaEdit::AddAttribute(AttributeDefinition::required("email", DataType::String));
    assert_eq!(bump(&person(), edit), VersionBump::Major);
  }

  #[test]
  fn making_optional_required_is_major() {
    let base = person().with_attribute(AttributeDefinition::optional("email", DataType::String));
    let edit = SchemaEdit::SetRequired { name: "email".into(), required: true };
    assert_eq!(bump(&base, edit), VersionBump::Major);
  }

  #[test]
  fn relaxing_required_is_minor() {
    let edit = SchemaEdit::SetRequired { name: "name".into(), required: false };
    assert_eq!(bump(&person(), edit), VersionBump::Minor);
  }

  #[test]
  fn removing_or_retyping_is_major() {
    assert_eq!(bump(&person(), SchemaEdit::RemoveAttribute { name: "name".into() }), VersionBump::Major);
    let retype = SchemaEdit::ChangeType { name: "name".into(), data_type: DataType::Int };
    assert_eq!(bump(&person(), retype), VersionBump::Major);
  }

  #[test]
  fn enum_widening_is_minor_and_narrowing_major() {
    let base = person().with_attribute(AttributeDefinition::optional(
      "role",
      DataType::Enum(vec!["author".into(), "editor".into()]),
    ));
    let widen = SchemaEdit::ChangeType {
      name:      "role".into(),
      data_type: DataType::Enum(vec!["author".into(), "editor".into(), "reviewer".into()]),
    };
    let narrow = SchemaEdit::ChangeType {
      name:      "role".into(),
      data_type: DataType::Enum(vec!["author".into()]),
    };
    assert_eq!(bump(&base, widen), VersionBump::Minor);
    assert_eq!(bump(&base, narrow), VersionBump::Major);
  }

  #[test]
  fn default_change_is_patch() {
    let edit = SchemaEdit::SetDefault { name: "name".into(), default: Some(json!("anonymous")) };
    assert_eq!(bump(&person(), edit), VersionBump::Patch);
  }

  #[test]
  fn vector_dimension_change_is_major_model_change_patch() {
    let base = person().with_vector_config(VectorConfig {
      dimension:       384,
      precision:       VectorPrecision::F32,
      embedding_model: "mini".into(),
    });
    let mut resized = base.clone();
    resized.vector_config.as_mut().unwrap().dimension = 768;
    let mut remodelled = base.clone();
    remodelled.vector_config.as_mut().unwrap().embedding_model = "mini-v2".into();

    assert_eq!(classify_change(&base, &resized).unwrap(), VersionBump::Major);
    assert_eq!(classify_change(&base, &remodelled).unwrap(), VersionBump::Patch);
  }

  #[test]
  fn strictness_changes() {
    assert_eq!(classify_change(&person(), &person().strict()).unwrap(), VersionBump::Major);
    assert_eq!(classify_change(&person().strict(), &person()).unwrap(), VersionBump::Patch);
  }

  #[test]
  fn kind_change_is_rejected() {
    let mut edge = person();
    edge.kind = SchemaKind::Edge;
    let err = classify_change(&person(), &edge).unwrap_err();
    assert!(matches!(err, Error::SchemaKindConflict { .. }));
  }

  #[test]
  fn edits_on_unknown_attributes_fail() {
    let mut def = person();
    let err = def.apply(&SchemaEdit::RemoveAttribute { name: "age".into() }).unwrap_err();
    assert!(matches!(err, Error::UnknownAttribute { .. }));
    let dup = SchemaEdit::AddAttribute(AttributeDefinition::optional("name", DataType::String));
    assert!(matches!(def.apply(&dup).unwrap_err(), Error::DuplicateAttribute { .. }));
  }

  #[test]
  fn schema_names_are_checked() {
    assert!(validate_schema_name("Person").is_ok());
    assert!(validate_schema_name("").is_err());
    assert!(validate_schema_name("  Person").is_err());
    assert!(validate_schema_name("Per\u{0}son").is_err());
    assert!(validate_schema_name(&"x".repeat(129)).is_err());
  }

  #[test]
  fn data_type_serde_shape() {
    assert_eq!(serde_json::to_value(DataType::Int).unwrap(), json!("int"));
    assert_eq!(
      serde_json::to_value(DataType::Enum(vec!["a".into()])).unwrap(),
      json!({ "enum": ["a"] })
    );
  }

  #[test]
  fn definition_round_trips_through_schema() {
    let def = person().with_endpoints("Person", "Org");
    let schema = Schema::from_definition(Uuid::new_v4(), def.clone(), SemVer::INITIAL);
    assert!(schema.is_active);
    assert_eq!(schema.definition(), def);
  }
}
