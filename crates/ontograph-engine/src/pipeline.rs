//! Graph construction: turn a batch of entity mentions into deduplicated
//! nodes and co-occurrence edges.
//!
//! Mentions are grouped by `(type_label, normalized name)`. Each group maps
//! to exactly one node per project, reused across documents; every pair of
//! distinct nodes mentioned in the same chunk gets at most one edge.

use std::collections::{HashMap, HashSet};

use ontograph_core::{
  external::ExtractedEntity,
  graph::{Direction, EdgeKey, NewEdge, NewNode, Node, display_name, normalize_name},
  project::UsageCounter,
  schema::{Schema, SchemaKind, validate_schema_name},
  store::{GraphStore, KnowledgeStore},
  validate::validate_payload,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Engine, Error, Result};

pub const DEFAULT_RELATIONSHIP: &str = "CO_OCCURS_WITH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
  pub relationship_type: String,
  pub direction:         Direction,
}

impl Default for PipelineOptions {
  fn default() -> Self {
    Self { relationship_type: DEFAULT_RELATIONSHIP.to_owned(), direction: Direction::Undirected }
  }
}

/// One extracted entity together with the chunk it was found in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
  pub chunk_id: Uuid,
  pub entity:   ExtractedEntity,
}

/// A mention that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
  pub chunk_id:     Uuid,
  pub type_label:   String,
  pub surface_text: String,
  pub reason:       String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
  pub mentions_received:          usize,
  pub mentions_skipped:           usize,
  pub nodes_created:              usize,
  pub nodes_reused:               usize,
  pub edges_created:              usize,
  pub edges_skipped_as_duplicate: usize,
  /// Every node the batch resolved to, in order of first mention.
  pub node_ids:                   Vec<Uuid>,
  pub errors:                     Vec<BatchError>,
}

// ─── Grouping ────────────────────────────────────────────────────────────────

/// All mentions sharing one dedup key.
struct Group {
  type_label:     String,
  normalized:     String,
  node_name:      String,
  surface_forms:  Vec<String>,
  max_confidence: f32,
  first_chunk_id: Uuid,
  /// Indexes into the mention list.
  mentions:       Vec<usize>,
}

impl Group {
  fn metadata(&self) -> Value {
    json!({
      "surface_forms":  self.surface_forms,
      "mention_count":  self.mentions.len(),
      "max_confidence": self.max_confidence,
      "first_chunk_id": self.first_chunk_id,
    })
  }
}

/// Why a mention cannot form a key, if it cannot.
fn reject_reason(entity: &ExtractedEntity) -> Option<String> {
  if normalize_name(&entity.surface_text).is_empty() {
    return Some("empty surface text".to_owned());
  }
  validate_schema_name(entity.type_label.trim()).err().map(|e| e.to_string())
}

fn batch_error(mention: &Mention, reason: impl Into<String>) -> BatchError {
  BatchError {
    chunk_id:     mention.chunk_id,
    type_label:   mention.entity.type_label.clone(),
    surface_text: mention.entity.surface_text.clone(),
    reason:       reason.into(),
  }
}

/// The initial structured data of a node created from mentions. Schemas
/// that declare a `name` attribute get the display name.
fn seed_payload(schema: &Schema, node_name: &str) -> Value {
  let mut data = Map::new();
  if schema.attribute("name").is_some() {
    data.insert("name".to_owned(), Value::String(node_name.to_owned()));
  }
  Value::Object(data)
}

impl<K, G> Engine<K, G>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  /// Run graph construction over one batch of mentions.
  ///
  /// Malformed mentions are skipped and listed in the report; they never
  /// fail the batch. Store failures do, and a rerun of the same batch
  /// converges because every write is keyed.
  pub async fn build_graph(
    &self,
    project_id: Uuid,
    mentions: Vec<Mention>,
    options: &PipelineOptions,
  ) -> Result<PipelineReport> {
    self.get_project(project_id).await?;
    let mut report = PipelineReport { mentions_received: mentions.len(), ..Default::default() };

    // 1. Group by dedup key.
    let mut groups: Vec<Group> = Vec::new();
    let mut by_key: HashMap<(String, String), usize> = HashMap::new();
    let mut chunk_groups: HashMap<Uuid, HashSet<usize>> = HashMap::new();
    for (idx, mention) in mentions.iter().enumerate() {
      if let Some(reason) = reject_reason(&mention.entity) {
        warn!(%project_id, chunk_id = %mention.chunk_id, %reason, "mention skipped");
        report.errors.push(batch_error(mention, reason));
        continue;
      }
      let type_label = mention.entity.type_label.trim().to_owned();
      let normalized = normalize_name(&mention.entity.surface_text);
      let surface = display_name(&mention.entity.surface_text);

      let slot = *by_key.entry((type_label.clone(), normalized.clone())).or_insert_with(|| {
        groups.push(Group {
          type_label,
          normalized,
          node_name: surface.clone(),
          surface_forms: Vec::new(),
          max_confidence: f32::MIN,
          first_chunk_id: mention.chunk_id,
          mentions: Vec::new(),
        });
        groups.len() - 1
      });
      let group = &mut groups[slot];
      if !group.surface_forms.contains(&surface) {
        group.surface_forms.push(surface);
      }
      group.max_confidence = group.max_confidence.max(mention.entity.confidence);
      group.mentions.push(idx);
      chunk_groups.entry(mention.chunk_id).or_default().insert(slot);
    }

    // The edge schema is resolved before any node is written so a bad
    // relationship type fails the batch without partial writes.
    let edge_schema = if chunk_groups.values().any(|slots| slots.len() > 1) {
      Some(self.ensure_schema(project_id, &options.relationship_type, SchemaKind::Edge).await?)
    } else {
      None
    };

    // 2. Resolve one schema per label and one node per group.
    let mut schemas: HashMap<String, std::result::Result<Schema, String>> = HashMap::new();
    let mut resolved: HashMap<usize, Uuid> = HashMap::new();
    for group in &groups {
      if !schemas.contains_key(&group.type_label) {
        let schema = match self.ensure_schema(project_id, &group.type_label, SchemaKind::Node).await {
          Ok(schema) => Ok(schema),
          Err(Error::Core(e)) => Err(e.to_string()),
          Err(e) => return Err(e),
        };
        schemas.insert(group.type_label.clone(), schema);
      }
      let schema = match &schemas[&group.type_label] {
        Ok(schema) => schema,
        Err(reason) => {
          for &idx in &group.mentions {
            report.errors.push(batch_error(&mentions[idx], reason.clone()));
          }
          continue;
        }
      };

      let structured_data = match validate_payload(schema, &seed_payload(schema, &group.node_name)) {
        Ok(data) => data,
        Err(e) => {
          for &idx in &group.mentions {
            report.errors.push(batch_error(&mentions[idx], e.to_string()));
          }
          continue;
        }
      };

      let new_node = NewNode {
        project_id,
        schema_id: schema.schema_id,
        schema_name: schema.schema_name.clone(),
        node_name: group.node_name.clone(),
        structured_data,
        unstructured_data: Value::Null,
        metadata: group.metadata(),
      };
      let (node, created) = self.upsert_node(new_node, &group.normalized).await?;
      if created {
        report.nodes_created += 1;
      } else {
        report.nodes_reused += 1;
      }
      for &idx in &group.mentions {
        resolved.insert(idx, node.node_id);
      }
      report.node_ids.push(node.node_id);
    }
    report.mentions_skipped = report.errors.len();

    // 3. Co-occurrence edges, one per unordered pair per chunk.
    let mut per_chunk: Vec<(Uuid, Vec<Uuid>)> = Vec::new();
    let mut chunk_slots: HashMap<Uuid, usize> = HashMap::new();
    for (idx, mention) in mentions.iter().enumerate() {
      let Some(&node_id) = resolved.get(&idx) else { continue };
      let slot = *chunk_slots.entry(mention.chunk_id).or_insert_with(|| {
        per_chunk.push((mention.chunk_id, Vec::new()));
        per_chunk.len() - 1
      });
      let nodes = &mut per_chunk[slot].1;
      if !nodes.contains(&node_id) {
        nodes.push(node_id);
      }
    }

    if let Some(edge_schema) = &edge_schema {
      let mut seen: HashSet<EdgeKey> = HashSet::new();

      for (chunk_id, nodes) in &per_chunk {
        for (i, &start) in nodes.iter().enumerate() {
          for &end in &nodes[i + 1..] {
            let new_edge = NewEdge {
              project_id,
              schema_id: edge_schema.schema_id,
              relationship_type: options.relationship_type.clone(),
              start_node_id: start,
              end_node_id: end,
              direction: options.direction,
              properties: json!({ "first_chunk_id": chunk_id }),
            }
            .canonical();

            if !seen.insert(new_edge.key()) {
              report.edges_skipped_as_duplicate += 1;
              continue;
            }
            let inserted = self
              .store_retry("insert_edge", || self.store.insert_edge_if_absent(new_edge.clone()))
              .await?;
            match inserted {
              Some(edge) => {
                debug!(edge_id = %edge.edge_id, "edge created");
                report.edges_created += 1;
              }
              None => report.edges_skipped_as_duplicate += 1,
            }
          }
        }
      }
    }

    self.count_usage(project_id, UsageCounter::Nodes, report.nodes_created).await?;
    self.count_usage(project_id, UsageCounter::Edges, report.edges_created).await?;

    info!(
      %project_id,
      mentions = report.mentions_received,
      skipped = report.mentions_skipped,
      nodes_created = report.nodes_created,
      nodes_reused = report.nodes_reused,
      edges_created = report.edges_created,
      edges_skipped = report.edges_skipped_as_duplicate,
      "graph batch processed",
    );
    Ok(report)
  }

  /// Insert-or-fetch on `(project, schema name, normalized name)`. Returns
  /// the node and whether this call created it.
  async fn upsert_node(&self, node: NewNode, normalized: &str) -> Result<(Node, bool)> {
    let project_id = node.project_id;
    let schema_name = node.schema_name.clone();
    let find = || self.store.find_node(project_id, &schema_name, normalized);

    if let Some(existing) = self.store_retry("find_node", find).await? {
      return Ok((existing, false));
    }
    let inserted = self
      .store_retry("insert_node", || self.store.insert_node_if_absent(node.clone()))
      .await?;
    if let Some(created) = inserted {
      debug!(node_id = %created.node_id, schema = %schema_name, "node created");
      return Ok((created, true));
    }

    // Lost the race: the winner's row must be visible now.
    for _ in 0..2 {
      if let Some(existing) = self.store_retry("find_node", find).await? {
        return Ok((existing, false));
      }
    }
    Err(Error::DuplicateKeyRace(format!("{schema_name}/{normalized}")))
  }

  pub(crate) async fn count_usage(
    &self,
    project_id: Uuid,
    counter: UsageCounter,
    by: usize,
  ) -> Result<()> {
    if by == 0 {
      return Ok(());
    }
    let call = self.store.increment_usage(project_id, counter, by as u64);
    self.store_once("increment_usage", call).await
  }
}
