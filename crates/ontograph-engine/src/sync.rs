//! Projection of the relational graph into the graph store, and its
//! verification.
//!
//! Sync is one-way and keyed: every node becomes a `MERGE`d vertex and every
//! edge a `MERGE`d relationship, so repeating a sync, or resuming an
//! interrupted one, converges. Verification only reports; it never repairs.

use std::{collections::HashSet, time::Instant};

use chrono::{DateTime, Utc};
use ontograph_core::{
  codec,
  project::UsageCounter,
  store::{GraphStore, KnowledgeStore, MergeOutcome, RelationshipUpsert, VertexUpsert},
};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Engine, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Nodes spot-checked by `verify`.
  pub sample_size: usize,
}

impl Default for SyncConfig {
  fn default() -> Self { Self { sample_size: 25 } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncItem {
  Vertex,
  Relationship,
}

/// A row that could not be written to the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
  pub item:   SyncItem,
  /// `node_id` for vertices, `edge_id` for relationships.
  pub id:     Uuid,
  pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
  pub project_id:              Uuid,
  pub started_at:              DateTime<Utc>,
  pub duration_ms:             u64,
  pub nodes_attempted:         usize,
  pub nodes_synced:            usize,
  pub relationships_attempted: usize,
  pub relationships_synced:    usize,
  pub vertices_created:        usize,
  pub vertices_updated:        usize,
  pub relationships_created:   usize,
  pub relationships_updated:   usize,
  pub failures:                Vec<SyncFailure>,
}

impl SyncResult {
  fn new(project_id: Uuid) -> Self {
    Self {
      project_id,
      started_at: Utc::now(),
      duration_ms: 0,
      nodes_attempted: 0,
      nodes_synced: 0,
      relationships_attempted: 0,
      relationships_synced: 0,
      vertices_created: 0,
      vertices_updated: 0,
      relationships_created: 0,
      relationships_updated: 0,
      failures: Vec::new(),
    }
  }

  /// Some rows failed; the rest were written.
  pub fn is_partial(&self) -> bool { !self.failures.is_empty() }

  /// The run changed nothing in the graph store.
  pub fn is_noop(&self) -> bool {
    self.vertices_created == 0
      && self.vertices_updated == 0
      && self.relationships_created == 0
      && self.relationships_updated == 0
  }
}

/// A sampled node whose graph copy differs from the relational row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
  pub node_id:           Uuid,
  pub relational_digest: String,
  /// `None` if the vertex is missing.
  pub graph_digest:      Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
  pub project_id:          Uuid,
  pub relational_nodes:    u64,
  pub graph_vertices:      u64,
  pub relational_edges:    u64,
  pub graph_relationships: u64,
  pub sampled:             usize,
  pub mismatches:          Vec<Mismatch>,
}

impl VerifyReport {
  pub fn is_consistent(&self) -> bool {
    self.relational_nodes == self.graph_vertices
      && self.relational_edges == self.graph_relationships
      && self.mismatches.is_empty()
  }
}

/// SHA-256 over the transport encoding, hex encoded.
pub fn digest(value: &Value) -> Result<String> {
  let encoded = codec::encode(value)?;
  Ok(hex::encode(Sha256::digest(encoded.as_bytes())))
}

impl<K, G> Engine<K, G>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  /// Project every node and edge of a project into the graph store.
  ///
  /// One sync per project runs at a time; a second concurrent call fails
  /// with [`Error::SyncInProgress`]. Rows that fail are listed in
  /// [`SyncResult::failures`] and do not stop the run.
  pub async fn sync(&self, project_id: Uuid) -> Result<SyncResult> {
    self.get_project(project_id).await?;
    let lock = self.sync_lock(project_id);
    let Ok(_guard) = lock.try_lock() else {
      return Err(Error::SyncInProgress(project_id));
    };

    let started = Instant::now();
    let mut result = SyncResult::new(project_id);

    let nodes = self.store_retry("list_nodes", || self.store.list_nodes(project_id)).await?;
    let edges = self.store_retry("list_edges", || self.store.list_edges(project_id)).await?;

    let mut missing: HashSet<Uuid> = HashSet::new();
    for node in &nodes {
      result.nodes_attempted += 1;
      let upsert = VertexUpsert::from_node(node);
      debug!(node_id = %node.node_id, cypher = %upsert.cypher(), "merge vertex");
      match self.graph_retry("merge_vertex", || self.graph.merge_vertex(upsert.clone())).await {
        Ok(outcome) => {
          result.nodes_synced += 1;
          match outcome {
            MergeOutcome::Created => result.vertices_created += 1,
            MergeOutcome::Updated => result.vertices_updated += 1,
            MergeOutcome::Unchanged => {}
          }
        }
        Err(e) => {
          warn!(node_id = %node.node_id, error = %e, "vertex sync failed");
          missing.insert(node.node_id);
          result.failures.push(SyncFailure {
            item:   SyncItem::Vertex,
            id:     node.node_id,
            reason: e.to_string(),
          });
        }
      }
    }

    for edge in &edges {
      result.relationships_attempted += 1;
      if missing.contains(&edge.start_node_id) || missing.contains(&edge.end_node_id) {
        result.failures.push(SyncFailure {
          item:   SyncItem::Relationship,
          id:     edge.edge_id,
          reason: "endpoint vertex missing".to_owned(),
        });
        continue;
      }
      let upsert = RelationshipUpsert::from_edge(edge);
      debug!(edge_id = %edge.edge_id, cypher = %upsert.cypher(), "merge relationship");
      let merged = self
        .graph_retry("merge_relationship", || self.graph.merge_relationship(upsert.clone()))
        .await;
      match merged {
        Ok(outcome) => {
          result.relationships_synced += 1;
          match outcome {
            MergeOutcome::Created => result.relationships_created += 1,
            MergeOutcome::Updated => result.relationships_updated += 1,
            MergeOutcome::Unchanged => {}
          }
        }
        Err(e) => {
          warn!(edge_id = %edge.edge_id, error = %e, "relationship sync failed");
          result.failures.push(SyncFailure {
            item:   SyncItem::Relationship,
            id:     edge.edge_id,
            reason: e.to_string(),
          });
        }
      }
    }

    self.count_usage(project_id, UsageCounter::Syncs, 1).await?;
    result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    info!(
      %project_id,
      nodes = result.nodes_synced,
      relationships = result.relationships_synced,
      failures = result.failures.len(),
      duration_ms = result.duration_ms,
      "sync finished",
    );
    Ok(result)
  }

  /// Compare counts between the two stores and spot-check a random sample
  /// of node payloads. Waits for a running sync to finish.
  pub async fn verify(&self, project_id: Uuid) -> Result<VerifyReport> {
    self.get_project(project_id).await?;
    let lock = self.sync_lock(project_id);
    let _guard = lock.lock().await;

    let relational_nodes =
      self.store_retry("count_nodes", || self.store.count_nodes(project_id)).await?;
    let relational_edges =
      self.store_retry("count_edges", || self.store.count_edges(project_id)).await?;
    let graph_vertices =
      self.graph_retry("count_vertices", || self.graph.count_vertices(project_id)).await?;
    let graph_relationships = self
      .graph_retry("count_relationships", || self.graph.count_relationships(project_id))
      .await?;

    let nodes = self.store_retry("list_nodes", || self.store.list_nodes(project_id)).await?;
    let sample: Vec<_> = {
      let mut rng = rand::thread_rng();
      nodes.choose_multiple(&mut rng, self.config.sync.sample_size).cloned().collect()
    };

    let mut mismatches = Vec::new();
    for node in &sample {
      let relational_digest = digest(&node.structured_data)?;
      let graph_side = self
        .graph_retry("vertex_properties", || self.graph.vertex_properties(node.node_id))
        .await?;
      let graph_digest = graph_side.as_ref().map(digest).transpose()?;
      if graph_digest.as_deref() != Some(relational_digest.as_str()) {
        mismatches.push(Mismatch { node_id: node.node_id, relational_digest, graph_digest });
      }
    }

    let report = VerifyReport {
      project_id,
      relational_nodes,
      graph_vertices,
      relational_edges,
      graph_relationships,
      sampled: sample.len(),
      mismatches,
    };
    if report.is_consistent() {
      info!(%project_id, sampled = report.sampled, "stores consistent");
    } else {
      warn!(
        %project_id,
        relational_nodes,
        graph_vertices,
        relational_edges,
        graph_relationships,
        mismatches = report.mismatches.len(),
        "stores diverge",
      );
    }
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn digest_depends_on_content() {
    let a = digest(&json!({ "age": 30 })).unwrap();
    assert_eq!(a.len(), 64);
    assert_eq!(a, digest(&json!({ "age": 30 })).unwrap());
    assert_ne!(a, digest(&json!({ "age": 31 })).unwrap());
  }

  #[test]
  fn result_flags() {
    let mut result = SyncResult::new(Uuid::nil());
    assert!(result.is_noop());
    assert!(!result.is_partial());
    result.failures.push(SyncFailure {
      item:   SyncItem::Vertex,
      id:     Uuid::nil(),
      reason: "boom".into(),
    });
    result.vertices_created = 1;
    assert!(result.is_partial());
    assert!(!result.is_noop());
  }
}
