//! `MemoryGraph`: a [`GraphStore`] over a `petgraph` stable graph.

use std::collections::HashMap;

use ontograph_core::{
  graph::{Direction, EdgeKey},
  store::{GraphStore, MergeOutcome, RelationshipUpsert, VertexUpsert},
};
use parking_lot::RwLock;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
struct Vertex {
  node_id:    Uuid,
  project_id: Uuid,
  label:      String,
  node_name:  String,
  properties: Value,
}

#[derive(Debug, Clone, PartialEq)]
struct Relationship {
  key:        EdgeKey,
  edge_id:    Uuid,
  project_id: Uuid,
  direction:  Direction,
  properties: Value,
}

#[derive(Default)]
struct Inner {
  graph:         StableDiGraph<Vertex, Relationship>,
  vertices:      HashMap<Uuid, NodeIndex>,
  relationships: HashMap<EdgeKey, EdgeIndex>,
}

/// Thread-safe in-memory property graph.
///
/// Undirected relationships are stored once, in the orientation given by
/// their key; callers are expected to hand in canonical keys.
#[derive(Default)]
pub struct MemoryGraph {
  inner: RwLock<Inner>,
}

impl MemoryGraph {
  pub fn new() -> Self { Self::default() }

  /// Label of a vertex, if it exists.
  pub fn label(&self, node_id: Uuid) -> Option<String> {
    let inner = self.inner.read();
    let idx = inner.vertices.get(&node_id)?;
    inner.graph.node_weight(*idx).map(|v| v.label.clone())
  }

  /// Ids of the vertices a vertex is connected to, in either direction.
  pub fn neighbours(&self, node_id: Uuid) -> Vec<Uuid> {
    let inner = self.inner.read();
    let Some(idx) = inner.vertices.get(&node_id) else {
      return Vec::new();
    };
    let mut out: Vec<Uuid> = inner
      .graph
      .neighbors_undirected(*idx)
      .filter_map(|n| inner.graph.node_weight(n).map(|v| v.node_id))
      .collect();
    out.sort();
    out.dedup();
    out
  }

  /// Properties of the relationship stored under `key`.
  pub fn relationship_properties(&self, key: &EdgeKey) -> Option<Value> {
    let inner = self.inner.read();
    let idx = inner.relationships.get(key)?;
    inner.graph.edge_weight(*idx).map(|r| r.properties.clone())
  }

  fn merge_vertex_sync(&self, upsert: VertexUpsert) -> Result<MergeOutcome> {
    let vertex = Vertex {
      node_id:    upsert.node_id,
      project_id: upsert.project_id,
      label:      upsert.label,
      node_name:  upsert.node_name,
      properties: upsert.properties,
    };

    let mut inner = self.inner.write();
    let current = inner.vertices.get(&vertex.node_id).copied();
    if let Some(existing) = current.and_then(|idx| inner.graph.node_weight_mut(idx)) {
      if existing.label != vertex.label {
        return Err(Error::LabelConflict {
          node_id:   vertex.node_id,
          existing:  existing.label.clone(),
          requested: vertex.label,
        });
      }
      if *existing == vertex {
        return Ok(MergeOutcome::Unchanged);
      }
      *existing = vertex;
      return Ok(MergeOutcome::Updated);
    }

    let node_id = vertex.node_id;
    let idx = inner.graph.add_node(vertex);
    inner.vertices.insert(node_id, idx);
    Ok(MergeOutcome::Created)
  }

  fn merge_relationship_sync(&self, upsert: RelationshipUpsert) -> Result<MergeOutcome> {
    let relationship = Relationship {
      key:        upsert.key,
      edge_id:    upsert.edge_id,
      project_id: upsert.project_id,
      direction:  upsert.direction,
      properties: upsert.properties,
    };

    let mut inner = self.inner.write();
    let start = *inner
      .vertices
      .get(&relationship.key.start_node_id)
      .ok_or(Error::MissingEndpoint(relationship.key.start_node_id))?;
    let end = *inner
      .vertices
      .get(&relationship.key.end_node_id)
      .ok_or(Error::MissingEndpoint(relationship.key.end_node_id))?;

    let current = inner.relationships.get(&relationship.key).copied();
    if let Some(existing) = current.and_then(|idx| inner.graph.edge_weight_mut(idx)) {
      if *existing == relationship {
        return Ok(MergeOutcome::Unchanged);
      }
      *existing = relationship;
      return Ok(MergeOutcome::Updated);
    }

    let key = relationship.key.clone();
    let idx = inner.graph.add_edge(start, end, relationship);
    inner.relationships.insert(key, idx);
    Ok(MergeOutcome::Created)
  }

  fn detach_delete_sync(&self, project_id: Uuid) -> u64 {
    let mut inner = self.inner.write();
    let doomed: Vec<(Uuid, NodeIndex)> = inner
      .vertices
      .iter()
      .filter(|(_, idx)| {
        inner.graph.node_weight(**idx).is_some_and(|v| v.project_id == project_id)
      })
      .map(|(id, idx)| (*id, *idx))
      .collect();

    for (node_id, idx) in &doomed {
      inner.graph.remove_node(*idx);
      inner.vertices.remove(node_id);
    }
    // Removing a node drops its edges; forget their keys before any slot is
    // reused.
    let Inner { graph, relationships, .. } = &mut *inner;
    relationships.retain(|_, idx| graph.edge_weight(*idx).is_some());

    doomed.len() as u64
  }
}

impl GraphStore for MemoryGraph {
  type Error = Error;

  async fn merge_vertex(&self, vertex: VertexUpsert) -> Result<MergeOutcome> {
    let node_id = vertex.node_id;
    let outcome = self.merge_vertex_sync(vertex)?;
    debug!(%node_id, ?outcome, "vertex merged");
    Ok(outcome)
  }

  async fn merge_relationship(&self, relationship: RelationshipUpsert) -> Result<MergeOutcome> {
    let edge_id = relationship.edge_id;
    let outcome = self.merge_relationship_sync(relationship)?;
    debug!(%edge_id, ?outcome, "relationship merged");
    Ok(outcome)
  }

  async fn count_vertices(&self, project_id: Uuid) -> Result<u64> {
    let inner = self.inner.read();
    let n = inner
      .graph
      .node_indices()
      .filter_map(|idx| inner.graph.node_weight(idx))
      .filter(|v| v.project_id == project_id)
      .count();
    Ok(n as u64)
  }

  async fn count_relationships(&self, project_id: Uuid) -> Result<u64> {
    let inner = self.inner.read();
    let n = inner
      .graph
      .edge_indices()
      .filter_map(|idx| inner.graph.edge_weight(idx))
      .filter(|r| r.project_id == project_id)
      .count();
    Ok(n as u64)
  }

  async fn vertex_properties(&self, node_id: Uuid) -> Result<Option<Value>> {
    let inner = self.inner.read();
    Ok(
      inner
        .vertices
        .get(&node_id)
        .and_then(|idx| inner.graph.node_weight(*idx))
        .map(|v| v.properties.clone()),
    )
  }

  async fn detach_delete_project(&self, project_id: Uuid) -> Result<u64> {
    let removed = self.detach_delete_sync(project_id);
    debug!(%project_id, removed, "project vertices detached and deleted");
    Ok(removed)
  }
}
