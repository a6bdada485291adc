//! Ontology proposals and their review state machine.
//!
//! ```text
//! PROPOSED ──update──▶ MODIFIED ──update──▶ MODIFIED
//!     │                    │
//!     └─review─┐           │
//!              ▼           ▼
//!          (reviewed) ──finalize──▶ FINALIZED (terminal)
//! ```
//!
//! Nothing here touches the schema registry. The engine's workflow service
//! turns a finalizable proposal into schemas and then calls
//! [`Proposal::mark_finalized`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  schema::{AttributeDefinition, SchemaDefinition, validate_schema_name},
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProposalStatus {
  Proposed,
  Modified,
  Finalized,
}

// ─── Draft ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeDraft {
  pub schema_name: String,
  #[serde(default)]
  pub attributes:  Vec<AttributeDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeTypeDraft {
  pub schema_name: String,
  pub from:        String,
  pub to:          String,
  #[serde(default)]
  pub attributes:  Vec<AttributeDefinition>,
}

/// The entity and relationship types of a proposed ontology.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OntologyDraft {
  #[serde(default)]
  pub nodes: Vec<NodeTypeDraft>,
  #[serde(default)]
  pub edges: Vec<EdgeTypeDraft>,
}

/// One edit applied by [`Proposal::update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OntologyEdit {
  AddNodeType(NodeTypeDraft),
  RemoveNodeType { schema_name: String },
  RenameNodeType { from: String, to: String },
  AddEdgeType(EdgeTypeDraft),
  RemoveEdgeType { schema_name: String },
  SetAttributes { schema_name: String, attributes: Vec<AttributeDefinition> },
  AddAttribute { schema_name: String, attribute: AttributeDefinition },
  RemoveAttribute { schema_name: String, attribute: String },
}

impl OntologyDraft {
  fn defines(&self, name: &str) -> bool {
    self.nodes.iter().any(|n| n.schema_name == name)
      || self.edges.iter().any(|e| e.schema_name == name)
  }

  pub fn node_type(&self, name: &str) -> Option<&NodeTypeDraft> {
    self.nodes.iter().find(|n| n.schema_name == name)
  }

  fn attributes_mut(&mut self, name: &str) -> Result<&mut Vec<AttributeDefinition>> {
    if let Some(node) = self.nodes.iter_mut().find(|n| n.schema_name == name) {
      return Ok(&mut node.attributes);
    }
    self
      .edges
      .iter_mut()
      .find(|e| e.schema_name == name)
      .map(|e| &mut e.attributes)
      .ok_or_else(|| Error::UnknownType(name.to_owned()))
  }

  fn ensure_new(&self, name: &str) -> Result<()> {
    validate_schema_name(name)?;
    if self.defines(name) {
      return Err(Error::DuplicateType(name.to_owned()));
    }
    Ok(())
  }

  pub fn apply(&mut self, edit: &OntologyEdit) -> Result<()> {
    match edit {
      OntologyEdit::AddNodeType(node) => {
        self.ensure_new(&node.schema_name)?;
        self.nodes.push(node.clone());
      }
      OntologyEdit::RemoveNodeType { schema_name } => {
        if self.node_type(schema_name).is_none() {
          return Err(Error::UnknownType(schema_name.clone()));
        }
        if let Some(edge) = self.edges.iter().find(|e| &e.from == schema_name || &e.to == schema_name) {
          return Err(Error::TypeInUse {
            schema_name: schema_name.clone(),
            edge:        edge.schema_name.clone(),
          });
        }
        self.nodes.retain(|n| &n.schema_name != schema_name);
      }
      OntologyEdit::RenameNodeType { from, to } => {
        if self.node_type(from).is_none() {
          return Err(Error::UnknownType(from.clone()));
        }
        self.ensure_new(to)?;
        for node in self.nodes.iter_mut().filter(|n| &n.schema_name == from) {
          node.schema_name = to.clone();
        }
        for edge in &mut self.edges {
          if &edge.from == from {
            edge.from = to.clone();
          }
          if &edge.to == from {
            edge.to = to.clone();
          }
        }
      }
      OntologyEdit::AddEdgeType(edge) => {
        self.ensure_new(&edge.schema_name)?;
        self.edges.push(edge.clone());
      }
      OntologyEdit::RemoveEdgeType { schema_name } => {
        if !self.edges.iter().any(|e| &e.schema_name == schema_name) {
          return Err(Error::UnknownType(schema_name.clone()));
        }
        self.edges.retain(|e| &e.schema_name != schema_name);
      }
      OntologyEdit::SetAttributes { schema_name, attributes } => {
        *self.attributes_mut(schema_name)? = attributes.clone();
      }
      OntologyEdit::AddAttribute { schema_name, attribute } => {
        let attrs = self.attributes_mut(schema_name)?;
        if attrs.iter().any(|a| a.name == attribute.name) {
          return Err(Error::DuplicateAttribute {
            schema:    schema_name.clone(),
            attribute: attribute.name.clone(),
          });
        }
        attrs.push(attribute.clone());
      }
      OntologyEdit::RemoveAttribute { schema_name, attribute } => {
        let attrs = self.attributes_mut(schema_name)?;
        if !attrs.iter().any(|a| &a.name == attribute) {
          return Err(Error::UnknownAttribute {
            schema:    schema_name.clone(),
            attribute: attribute.clone(),
          });
        }
        attrs.retain(|a| &a.name != attribute);
      }
    }
    Ok(())
  }

  /// Schema definitions for every type, node types first.
  pub fn definitions(&self) -> Vec<SchemaDefinition> {
    let nodes = self.nodes.iter().map(|n| SchemaDefinition {
      attributes: n.attributes.clone(),
      ..SchemaDefinition::node(&n.schema_name)
    });
    let edges = self.edges.iter().map(|e| SchemaDefinition {
      attributes: e.attributes.clone(),
      ..SchemaDefinition::edge(&e.schema_name).with_endpoints(&e.from, &e.to)
    });
    nodes.chain(edges).collect()
  }
}

// ─── Proposal ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
  pub proposal_id:          Uuid,
  pub project_id:           Uuid,
  pub status:               ProposalStatus,
  /// Set by an explicit review or by any edit. Finalize requires it.
  pub reviewed:             bool,
  pub ontology:             OntologyDraft,
  /// Schemas created or reused by finalize, in draft order.
  pub finalized_schema_ids: Vec<Uuid>,
  pub created_at:           DateTime<Utc>,
  pub updated_at:           DateTime<Utc>,
}

impl Proposal {
  pub fn new(project_id: Uuid, ontology: OntologyDraft) -> Self {
    let now = Utc::now();
    Self {
      proposal_id: Uuid::new_v4(),
      project_id,
      status: ProposalStatus::Proposed,
      reviewed: false,
      ontology,
      finalized_schema_ids: Vec::new(),
      created_at: now,
      updated_at: now,
    }
  }

  pub fn is_finalized(&self) -> bool { self.status == ProposalStatus::Finalized }

  fn ensure_open(&self) -> Result<()> {
    if self.is_finalized() {
      return Err(Error::ProposalFinalized(self.proposal_id));
    }
    Ok(())
  }

  /// Approve the draft as is.
  pub fn review(&mut self) -> Result<()> {
    self.ensure_open()?;
    self.reviewed = true;
    self.updated_at = Utc::now();
    Ok(())
  }

  /// Apply `edits` in order. Either all of them apply or the proposal is
  /// left untouched.
  pub fn update(&mut self, edits: &[OntologyEdit]) -> Result<()> {
    self.ensure_open()?;
    let mut draft = self.ontology.clone();
    for edit in edits {
      draft.apply(edit)?;
    }
    self.ontology = draft;
    self.status = ProposalStatus::Modified;
    self.reviewed = true;
    self.updated_at = Utc::now();
    Ok(())
  }

  /// Finalize is allowed once a user has looked at the proposal.
  pub fn ensure_finalizable(&self) -> Result<()> {
    self.ensure_open()?;
    if !self.reviewed {
      return Err(Error::ProposalNotReviewed(self.proposal_id));
    }
    Ok(())
  }

  pub fn mark_finalized(&mut self, schema_ids: Vec<Uuid>) {
    self.status = ProposalStatus::Finalized;
    self.finalized_schema_ids = schema_ids;
    self.updated_at = Utc::now();
  }
}
