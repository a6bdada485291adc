//! Nodes and edges: the typed graph held in the relational store.
//!
//! A node is pinned to the schema row it was created under and is never
//! mutated afterwards, except to attach an embedding. Edges are immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Case-fold and whitespace-normalise an entity surface form.
///
/// Leading and trailing whitespace is dropped, internal runs collapse to a
/// single space and the result is Unicode-lowercased.
pub fn normalize_name(surface: &str) -> String {
  surface.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Trimmed display form with internal whitespace collapsed.
pub fn display_name(surface: &str) -> String {
  surface.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Direction {
  Directed,
  #[default]
  Undirected,
}

// ─── Nodes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub node_id:           Uuid,
  pub project_id:        Uuid,
  /// The schema row this node was validated against. Never changes.
  pub schema_id:         Uuid,
  pub schema_name:       String,
  pub node_name:         String,
  pub normalized_name:   String,
  pub structured_data:   Value,
  pub unstructured_data: Value,
  pub vector:            Option<Vec<f32>>,
  pub metadata:          Value,
  pub created_at:        DateTime<Utc>,
}

/// Input to [`KnowledgeStore::insert_node_if_absent`](crate::store::KnowledgeStore::insert_node_if_absent).
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
  pub project_id:        Uuid,
  pub schema_id:         Uuid,
  pub schema_name:       String,
  pub node_name:         String,
  pub structured_data:   Value,
  pub unstructured_data: Value,
  pub metadata:          Value,
}

impl NewNode {
  pub fn normalized_name(&self) -> String { normalize_name(&self.node_name) }

  pub fn into_node(self) -> Node {
    Node {
      node_id:           Uuid::new_v4(),
      normalized_name:   self.normalized_name(),
      project_id:        self.project_id,
      schema_id:         self.schema_id,
      schema_name:       self.schema_name,
      node_name:         self.node_name,
      structured_data:   self.structured_data,
      unstructured_data: self.unstructured_data,
      vector:            None,
      metadata:          self.metadata,
      created_at:        Utc::now(),
    }
  }
}

// ─── Edges ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
  pub edge_id:           Uuid,
  pub project_id:        Uuid,
  pub schema_id:         Uuid,
  pub relationship_type: String,
  pub start_node_id:     Uuid,
  pub end_node_id:       Uuid,
  pub direction:         Direction,
  pub properties:        Value,
  pub created_at:        DateTime<Utc>,
}

impl Edge {
  pub fn key(&self) -> EdgeKey {
    EdgeKey {
      start_node_id:     self.start_node_id,
      end_node_id:       self.end_node_id,
      relationship_type: self.relationship_type.clone(),
    }
  }
}

/// The identity of an edge within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
  pub start_node_id:     Uuid,
  pub end_node_id:       Uuid,
  pub relationship_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEdge {
  pub project_id:        Uuid,
  pub schema_id:         Uuid,
  pub relationship_type: String,
  pub start_node_id:     Uuid,
  pub end_node_id:       Uuid,
  pub direction:         Direction,
  pub properties:        Value,
}

impl NewEdge {
  /// Undirected edges are stored with the smaller node id as the start, so
  /// `(a, b)` and `(b, a)` share one key.
  pub fn canonical(mut self) -> Self {
    if self.direction == Direction::Undirected && self.end_node_id < self.start_node_id {
      std::mem::swap(&mut self.start_node_id, &mut self.end_node_id);
    }
    self
  }

  /// The key of the canonical form.
  pub fn key(&self) -> EdgeKey {
    let (start, end) = match self.direction {
      Direction::Undirected if self.end_node_id < self.start_node_id => {
        (self.end_node_id, self.start_node_id)
      }
      _ => (self.start_node_id, self.end_node_id),
    };
    EdgeKey { start_node_id: start, end_node_id: end, relationship_type: self.relationship_type.clone() }
  }

  pub fn into_edge(self) -> Edge {
    let edge = self.canonical();
    Edge {
      edge_id:           Uuid::new_v4(),
      project_id:        edge.project_id,
      schema_id:         edge.schema_id,
      relationship_type: edge.relationship_type,
      start_node_id:     edge.start_node_id,
      end_node_id:       edge.end_node_id,
      direction:         edge.direction,
      properties:        edge.properties,
      created_at:        Utc::now(),
    }
  }
}
