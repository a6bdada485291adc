//! The `KnowledgeStore` and `GraphStore` traits.
//!
//! `KnowledgeStore` is the relational system of record (e.g.
//! `ontograph-store-sqlite`). `GraphStore` is the query-side property graph
//! the synchronizer projects into (e.g. `ontograph-graph-mem`). The engine
//! depends on these abstractions, not on any concrete backend.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  document::{Chunk, Document, NewChunk},
  graph::{Direction, Edge, EdgeKey, NewEdge, NewNode, Node},
  ontology::Proposal,
  project::{NewProject, Project, UsageCounter},
  schema::Schema,
};

/// Errors that may succeed when the same call is repeated.
pub trait Transient {
  fn is_transient(&self) -> bool;
}

/// Result of an insert-or-fetch on a unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
  Created,
  Existing,
}

/// Result of a graph `MERGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
  Created,
  Updated,
  Unchanged,
}

// ─── Relational store ────────────────────────────────────────────────────────

/// Abstraction over the relational system of record.
///
/// Nodes, edges, schemas and proposals carry semi-structured columns and are
/// written one row per statement, each in its own transaction. Chunks are
/// scalar-only and may be written in batches.
pub trait KnowledgeStore: Send + Sync {
  type Error: std::error::Error + Transient + Send + Sync + 'static;

  // ── Projects ──────────────────────────────────────────────────────────

  fn create_project(
    &self,
    input: NewProject,
  ) -> impl Future<Output = Result<Project, Self::Error>> + Send + '_;

  fn get_project(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Option<Project>, Self::Error>> + Send + '_;

  fn list_projects(&self) -> impl Future<Output = Result<Vec<Project>, Self::Error>> + Send + '_;

  /// Add `by` to one of the project's usage counters.
  fn increment_usage(
    &self,
    project_id: Uuid,
    counter: UsageCounter,
    by: u64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete the project and everything it owns in one transaction. Returns
  /// `false` if the project did not exist.
  fn teardown_project(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Documents & chunks ────────────────────────────────────────────────

  fn add_document(
    &self,
    project_id: Uuid,
    filename: String,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + '_;

  /// Persist chunks in the order given; `chunk_index` follows that order.
  fn insert_chunks(
    &self,
    project_id: Uuid,
    chunks: Vec<NewChunk>,
  ) -> impl Future<Output = Result<Vec<Chunk>, Self::Error>> + Send + '_;

  /// Chunks of one document, in document order.
  fn list_chunks(
    &self,
    file_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Chunk>, Self::Error>> + Send + '_;

  fn set_chunk_embedding(
    &self,
    chunk_id: Uuid,
    embedding: Vec<f32>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Schemas ───────────────────────────────────────────────────────────

  /// Insert a schema row, or fetch the row that already holds its
  /// `(project_id, schema_name, version)` slot or its active slot.
  fn insert_schema(
    &self,
    schema: Schema,
  ) -> impl Future<Output = Result<(Schema, UpsertOutcome), Self::Error>> + Send + '_;

  /// Deactivate `previous` and insert `schema` atomically. Fails with
  /// `SchemaInactive` if `previous` is no longer the active row.
  fn supersede_schema(
    &self,
    previous: Uuid,
    schema: Schema,
  ) -> impl Future<Output = Result<Schema, Self::Error>> + Send + '_;

  fn get_schema(
    &self,
    schema_id: Uuid,
  ) -> impl Future<Output = Result<Option<Schema>, Self::Error>> + Send + '_;

  fn get_active_schema<'a>(
    &'a self,
    project_id: Uuid,
    schema_name: &'a str,
  ) -> impl Future<Output = Result<Option<Schema>, Self::Error>> + Send + 'a;

  fn list_schemas(
    &self,
    project_id: Uuid,
    active_only: bool,
  ) -> impl Future<Output = Result<Vec<Schema>, Self::Error>> + Send + '_;

  /// Every version of one schema name, oldest first.
  fn schema_history<'a>(
    &'a self,
    project_id: Uuid,
    schema_name: &'a str,
  ) -> impl Future<Output = Result<Vec<Schema>, Self::Error>> + Send + 'a;

  // ── Ontology proposals ────────────────────────────────────────────────

  fn insert_proposal(
    &self,
    proposal: Proposal,
  ) -> impl Future<Output = Result<Proposal, Self::Error>> + Send + '_;

  fn get_proposal(
    &self,
    proposal_id: Uuid,
  ) -> impl Future<Output = Result<Option<Proposal>, Self::Error>> + Send + '_;

  /// Overwrite the mutable fields of a stored proposal.
  fn save_proposal(
    &self,
    proposal: Proposal,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Nodes ─────────────────────────────────────────────────────────────

  /// Insert unless a node with the same `(project_id, schema_name,
  /// normalized_name)` exists. Returns `None` on conflict.
  fn insert_node_if_absent(
    &self,
    node: NewNode,
  ) -> impl Future<Output = Result<Option<Node>, Self::Error>> + Send + '_;

  fn find_node<'a>(
    &'a self,
    project_id: Uuid,
    schema_name: &'a str,
    normalized_name: &'a str,
  ) -> impl Future<Output = Result<Option<Node>, Self::Error>> + Send + 'a;

  fn get_node(
    &self,
    node_id: Uuid,
  ) -> impl Future<Output = Result<Option<Node>, Self::Error>> + Send + '_;

  fn list_nodes(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Node>, Self::Error>> + Send + '_;

  fn count_nodes(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Attach an embedding. The only mutation a node ever sees.
  fn set_node_vector(
    &self,
    node_id: Uuid,
    vector: Vec<f32>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Edges ─────────────────────────────────────────────────────────────

  /// Insert the canonical form of `edge` unless its key exists. Returns
  /// `None` on conflict.
  fn insert_edge_if_absent(
    &self,
    edge: NewEdge,
  ) -> impl Future<Output = Result<Option<Edge>, Self::Error>> + Send + '_;

  fn find_edge(
    &self,
    project_id: Uuid,
    key: EdgeKey,
  ) -> impl Future<Output = Result<Option<Edge>, Self::Error>> + Send + '_;

  fn list_edges(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Edge>, Self::Error>> + Send + '_;

  fn count_edges(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}

// ─── Graph store ─────────────────────────────────────────────────────────────

/// A labelled vertex keyed by `node_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexUpsert {
  pub node_id:    Uuid,
  pub project_id: Uuid,
  pub label:      String,
  pub node_name:  String,
  pub properties: Value,
}

impl VertexUpsert {
  pub fn from_node(node: &Node) -> Self {
    Self {
      node_id:    node.node_id,
      project_id: node.project_id,
      label:      node.schema_name.clone(),
      node_name:  node.node_name.clone(),
      properties: node.structured_data.clone(),
    }
  }

  /// The Cypher this write corresponds to, with `$`-parameters.
  pub fn cypher(&self) -> String {
    format!(
      "MERGE (v:{} {{node_id: $node_id}}) SET v.project_id = $project_id, v.node_name = \
       $node_name, v += $properties",
      quote_ident(&self.label)
    )
  }
}

/// A typed relationship keyed by `(start, end, type)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipUpsert {
  pub key:        EdgeKey,
  pub edge_id:    Uuid,
  pub project_id: Uuid,
  pub direction:  Direction,
  pub properties: Value,
}

impl RelationshipUpsert {
  pub fn from_edge(edge: &Edge) -> Self {
    Self {
      key:        edge.key(),
      edge_id:    edge.edge_id,
      project_id: edge.project_id,
      direction:  edge.direction,
      properties: edge.properties.clone(),
    }
  }

  pub fn cypher(&self) -> String {
    let arrow = match self.direction {
      Direction::Directed => "->",
      Direction::Undirected => "-",
    };
    format!(
      "MATCH (a {{node_id: $start_node_id}}), (b {{node_id: $end_node_id}}) MERGE \
       (a)-[r:{}]{arrow}(b) SET r.edge_id = $edge_id, r.project_id = $project_id, r.direction = \
       $direction, r += $properties",
      quote_ident(&self.key.relationship_type)
    )
  }
}

fn quote_ident(ident: &str) -> String { format!("`{}`", ident.replace('`', "``")) }

/// Abstraction over the graph-query store.
///
/// Writes are `MERGE`s: repeating one with the same input leaves the graph
/// unchanged. A relationship is only merged between vertices that already
/// exist.
pub trait GraphStore: Send + Sync {
  type Error: std::error::Error + Transient + Send + Sync + 'static;

  fn merge_vertex(
    &self,
    vertex: VertexUpsert,
  ) -> impl Future<Output = Result<MergeOutcome, Self::Error>> + Send + '_;

  fn merge_relationship(
    &self,
    relationship: RelationshipUpsert,
  ) -> impl Future<Output = Result<MergeOutcome, Self::Error>> + Send + '_;

  fn count_vertices(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  fn count_relationships(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// The stored properties of one vertex, or `None` if it is absent.
  fn vertex_properties(
    &self,
    node_id: Uuid,
  ) -> impl Future<Output = Result<Option<Value>, Self::Error>> + Send + '_;

  /// Remove every vertex of a project together with its relationships.
  /// Returns the number of vertices removed.
  fn detach_delete_project(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}
