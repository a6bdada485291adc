//! [`SqliteStore`], the SQLite implementation of [`KnowledgeStore`].

use std::{path::Path, sync::Arc, time::Duration};

use ontograph_core::{
  document::{Chunk, Document, NewChunk},
  graph::{Edge, EdgeKey, NewEdge, NewNode, Node},
  ontology::{Proposal, ProposalStatus},
  project::{NewProject, Project, UsageCounter},
  schema::Schema,
  store::{KnowledgeStore, UpsertOutcome},
};
use rusqlite::{Row, params_from_iter, types::Value as SqlValue};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    CHUNK_COLUMNS, EDGE_COLUMNS, NODE_COLUMNS, PROJECT_COLUMNS, PROPOSAL_COLUMNS, RawChunk,
    RawEdge, RawNode, RawProject, RawProposal, RawSchema, SCHEMA_COLUMNS, encode_dt,
    encode_embedding, encode_uuid, semi,
  },
  rewrite::{SemiStructuredRewriter, StatementInterceptor},
  schema::SCHEMA,
};

/// Rows per multi-row INSERT for scalar-only tables.
const CHUNK_BATCH: usize = 100;

const INSERT_SCHEMA: &str = "INSERT INTO schemas (
     schema_id, project_id, schema_name, kind, version_major, version_minor,
     version_patch, is_active, strict, attributes, vector_config,
     unstructured_config, endpoints, created_at
   ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";

const INSERT_SCHEMA_OR_IGNORE: &str = "INSERT OR IGNORE INTO schemas (
     schema_id, project_id, schema_name, kind, version_major, version_minor,
     version_patch, is_active, strict, attributes, vector_config,
     unstructured_config, endpoints, created_at
   ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";

fn text(s: impl Into<String>) -> SqlValue { SqlValue::Text(s.into()) }

fn uuid(id: Uuid) -> SqlValue { SqlValue::Text(encode_uuid(id)) }

fn int(n: impl Into<i64>) -> SqlValue { SqlValue::Integer(n.into()) }

fn usize_int(n: usize) -> SqlValue { SqlValue::Integer(i64::try_from(n).unwrap_or(i64::MAX)) }

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Ontograph knowledge store backed by a single SQLite file.
///
/// Cloning is cheap; the connection and interceptor are reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:        tokio_rusqlite::Connection,
  interceptor: Arc<dyn StatementInterceptor>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::init(tokio_rusqlite::Connection::open(path).await?).await
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    Self::init(tokio_rusqlite::Connection::open_in_memory().await?).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, interceptor: Arc::new(SemiStructuredRewriter::default()) })
  }

  /// Replace the statement interceptor applied to every write.
  pub fn with_interceptor(mut self, interceptor: impl StatementInterceptor) -> Self {
    self.interceptor = Arc::new(interceptor);
    self
  }

  /// Execute one write statement in its own transaction and commit it.
  async fn write_row(&self, sql: &str, params: Vec<SqlValue>) -> Result<usize> {
    let sql = self.interceptor.intercept(sql)?.into_owned();
    debug!(%sql, "write");
    let changed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(&sql, params_from_iter(params))?;
        tx.commit()?;
        Ok(changed)
      })
      .await?;
    Ok(changed)
  }

  async fn query_rows<T, F>(&self, sql: String, params: Vec<SqlValue>, map: F) -> Result<Vec<T>>
  where
    T: Send + 'static,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
  {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(params), map)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  async fn query_first<T, F>(&self, sql: String, params: Vec<SqlValue>, map: F) -> Result<Option<T>>
  where
    T: Send + 'static,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T> + Send + 'static,
  {
    Ok(self.query_rows(sql, params, map).await?.into_iter().next())
  }

  async fn count(&self, sql: &'static str, id: Uuid) -> Result<u64> {
    let id = encode_uuid(id);
    let n: i64 = self
      .conn
      .call(move |conn| Ok(conn.query_row(sql, [id], |r| r.get(0))?))
      .await?;
    Ok(u64::try_from(n).unwrap_or(0))
  }

  async fn schema_by_version(&self, schema: &Schema) -> Result<Option<Schema>> {
    let raw = self
      .query_first(
        format!(
          "SELECT {SCHEMA_COLUMNS} FROM schemas
           WHERE project_id = ?1 AND schema_name = ?2
             AND version_major = ?3 AND version_minor = ?4 AND version_patch = ?5"
        ),
        vec![
          uuid(schema.project_id),
          text(schema.schema_name.as_str()),
          int(schema.version.major),
          int(schema.version.minor),
          int(schema.version.patch),
        ],
        RawSchema::from_row,
      )
      .await?;
    raw.map(RawSchema::into_schema).transpose()
  }
}

fn schema_params(s: &Schema) -> Result<Vec<SqlValue>> {
  Ok(vec![
    uuid(s.schema_id),
    uuid(s.project_id),
    text(s.schema_name.as_str()),
    text(s.kind.to_string()),
    int(s.version.major),
    int(s.version.minor),
    int(s.version.patch),
    int(s.is_active),
    int(s.strict),
    semi(&s.attributes)?,
    semi(&s.vector_config)?,
    semi(&s.unstructured_config)?,
    semi(&s.endpoints)?,
    text(encode_dt(s.created_at)),
  ])
}

// ─── KnowledgeStore impl ─────────────────────────────────────────────────────

impl KnowledgeStore for SqliteStore {
  type Error = Error;

  // ── Projects ──────────────────────────────────────────────────────────────

  async fn create_project(&self, input: NewProject) -> Result<Project> {
    let project = input.into_project();
    self
      .write_row(
        "INSERT INTO projects (project_id, name, status, owner, config, stats, tags, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        vec![
          uuid(project.project_id),
          text(project.name.as_str()),
          text(project.status.to_string()),
          project.owner.clone().map_or(SqlValue::Null, SqlValue::Text),
          semi(&project.config)?,
          semi(&project.stats)?,
          semi(&project.tags)?,
          text(encode_dt(project.created_at)),
        ],
      )
      .await?;
    Ok(project)
  }

  async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>> {
    let raw = self
      .query_first(
        format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_id = ?1"),
        vec![uuid(project_id)],
        RawProject::from_row,
      )
      .await?;
    raw.map(RawProject::into_project).transpose()
  }

  async fn list_projects(&self) -> Result<Vec<Project>> {
    let raws = self
      .query_rows(
        format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at, project_id"),
        vec![],
        RawProject::from_row,
      )
      .await?;
    raws.into_iter().map(RawProject::into_project).collect()
  }

  async fn increment_usage(&self, project_id: Uuid, counter: UsageCounter, by: u64) -> Result<()> {
    let changed = self
      .write_row(
        "UPDATE projects
         SET stats = json_set(stats, '$.' || ?2, coalesce(json_extract(stats, '$.' || ?2), 0) + ?3)
         WHERE project_id = ?1",
        vec![uuid(project_id), text(counter.to_string()), int(i64::try_from(by).unwrap_or(i64::MAX))],
      )
      .await?;
    if changed == 0 {
      return Err(Error::ProjectNotFound(project_id));
    }
    Ok(())
  }

  async fn teardown_project(&self, project_id: Uuid) -> Result<bool> {
    let id = encode_uuid(project_id);
    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for table in ["edges", "nodes", "chunks", "documents", "ontology_proposals", "schemas"] {
          tx.execute(&format!("DELETE FROM {table} WHERE project_id = ?1"), [&id])?;
        }
        let removed = tx.execute("DELETE FROM projects WHERE project_id = ?1", [&id])?;
        tx.commit()?;
        Ok(removed > 0)
      })
      .await?;
    Ok(removed)
  }

  // ── Documents & chunks ────────────────────────────────────────────────────

  async fn add_document(&self, project_id: Uuid, filename: String) -> Result<Document> {
    let document = Document {
      file_id: Uuid::new_v4(),
      project_id,
      filename,
      created_at: chrono::Utc::now(),
    };
    self
      .write_row(
        "INSERT INTO documents (file_id, project_id, filename, created_at) VALUES (?1, ?2, ?3, ?4)",
        vec![
          uuid(document.file_id),
          uuid(project_id),
          text(document.filename.as_str()),
          text(encode_dt(document.created_at)),
        ],
      )
      .await?;
    Ok(document)
  }

  async fn insert_chunks(&self, project_id: Uuid, chunks: Vec<NewChunk>) -> Result<Vec<Chunk>> {
    let chunks: Vec<Chunk> = chunks
      .into_iter()
      .enumerate()
      .map(|(i, c)| c.into_chunk(project_id, u32::try_from(i).unwrap_or(u32::MAX)))
      .collect();

    let mut statements = Vec::new();
    for batch in chunks.chunks(CHUNK_BATCH) {
      let tuples = vec!["(?, ?, ?, ?, ?, ?, ?, ?)"; batch.len()].join(", ");
      let sql = format!("INSERT INTO chunks ({CHUNK_COLUMNS}) VALUES {tuples}");
      let sql = self.interceptor.intercept(&sql)?.into_owned();
      let params: Vec<SqlValue> = batch
        .iter()
        .flat_map(|c| {
          [
            uuid(c.chunk_id),
            uuid(c.file_id),
            uuid(c.project_id),
            int(c.chunk_index),
            usize_int(c.char_start),
            usize_int(c.char_end),
            text(c.text.as_str()),
            c.embedding.as_deref().map_or(SqlValue::Null, |e| SqlValue::Blob(encode_embedding(e))),
          ]
        })
        .collect();
      statements.push((sql, params));
    }

    debug!(chunks = chunks.len(), batches = statements.len(), "insert chunks");
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for (sql, params) in statements {
          tx.execute(&sql, params_from_iter(params))?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(chunks)
  }

  async fn list_chunks(&self, file_id: Uuid) -> Result<Vec<Chunk>> {
    let raws = self
      .query_rows(
        format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE file_id = ?1 ORDER BY chunk_index"),
        vec![uuid(file_id)],
        RawChunk::from_row,
      )
      .await?;
    raws.into_iter().map(RawChunk::into_chunk).collect()
  }

  async fn set_chunk_embedding(&self, chunk_id: Uuid, embedding: Vec<f32>) -> Result<()> {
    self
      .write_row(
        "UPDATE chunks SET embedding = ?2 WHERE chunk_id = ?1",
        vec![uuid(chunk_id), SqlValue::Blob(encode_embedding(&embedding))],
      )
      .await?;
    Ok(())
  }

  // ── Schemas ───────────────────────────────────────────────────────────────

  async fn insert_schema(&self, schema: Schema) -> Result<(Schema, UpsertOutcome)> {
    let changed = self.write_row(INSERT_SCHEMA_OR_IGNORE, schema_params(&schema)?).await?;
    if changed == 1 {
      return Ok((schema, UpsertOutcome::Created));
    }
    if let Some(existing) = self.schema_by_version(&schema).await? {
      return Ok((existing, UpsertOutcome::Existing));
    }
    match self.get_active_schema(schema.project_id, &schema.schema_name).await? {
      Some(active) => Ok((active, UpsertOutcome::Existing)),
      None => Err(ontograph_core::Error::SchemaNotFound(schema.schema_name).into()),
    }
  }

  async fn supersede_schema(&self, previous: Uuid, schema: Schema) -> Result<Schema> {
    let sql = self.interceptor.intercept(INSERT_SCHEMA)?.into_owned();
    let params = schema_params(&schema)?;
    let previous_id = encode_uuid(previous);
    debug!(%previous, schema_id = %schema.schema_id, version = %schema.version, "supersede schema");

    let swapped = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let deactivated = tx.execute(
          "UPDATE schemas SET is_active = 0 WHERE schema_id = ?1 AND is_active = 1",
          [&previous_id],
        )?;
        if deactivated == 0 {
          return Ok(false);
        }
        tx.execute(&sql, params_from_iter(params))?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !swapped {
      return Err(ontograph_core::Error::SchemaInactive(previous).into());
    }
    Ok(schema)
  }

  async fn get_schema(&self, schema_id: Uuid) -> Result<Option<Schema>> {
    let raw = self
      .query_first(
        format!("SELECT {SCHEMA_COLUMNS} FROM schemas WHERE schema_id = ?1"),
        vec![uuid(schema_id)],
        RawSchema::from_row,
      )
      .await?;
    raw.map(RawSchema::into_schema).transpose()
  }

  async fn get_active_schema(&self, project_id: Uuid, schema_name: &str) -> Result<Option<Schema>> {
    let raw = self
      .query_first(
        format!(
          "SELECT {SCHEMA_COLUMNS} FROM schemas
           WHERE project_id = ?1 AND schema_name = ?2 AND is_active = 1"
        ),
        vec![uuid(project_id), text(schema_name)],
        RawSchema::from_row,
      )
      .await?;
    raw.map(RawSchema::into_schema).transpose()
  }

  async fn list_schemas(&self, project_id: Uuid, active_only: bool) -> Result<Vec<Schema>> {
    let raws = self
      .query_rows(
        format!(
          "SELECT {SCHEMA_COLUMNS} FROM schemas
           WHERE project_id = ?1 AND (?2 = 0 OR is_active = 1)
           ORDER BY schema_name, version_major, version_minor, version_patch"
        ),
        vec![uuid(project_id), int(active_only)],
        RawSchema::from_row,
      )
      .await?;
    raws.into_iter().map(RawSchema::into_schema).collect()
  }

  async fn schema_history(&self, project_id: Uuid, schema_name: &str) -> Result<Vec<Schema>> {
    let raws = self
      .query_rows(
        format!(
          "SELECT {SCHEMA_COLUMNS} FROM schemas
           WHERE project_id = ?1 AND schema_name = ?2
           ORDER BY version_major, version_minor, version_patch"
        ),
        vec![uuid(project_id), text(schema_name)],
        RawSchema::from_row,
      )
      .await?;
    raws.into_iter().map(RawSchema::into_schema).collect()
  }

  // ── Ontology proposals ────────────────────────────────────────────────────

  async fn insert_proposal(&self, proposal: Proposal) -> Result<Proposal> {
    self
      .write_row(
        "INSERT INTO ontology_proposals (
           proposal_id, project_id, status, reviewed, ontology,
           finalized_schema_ids, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        vec![
          uuid(proposal.proposal_id),
          uuid(proposal.project_id),
          text(proposal.status.to_string()),
          int(proposal.reviewed),
          semi(&proposal.ontology)?,
          semi(&proposal.finalized_schema_ids)?,
          text(encode_dt(proposal.created_at)),
          text(encode_dt(proposal.updated_at)),
        ],
      )
      .await?;
    Ok(proposal)
  }

  async fn get_proposal(&self, proposal_id: Uuid) -> Result<Option<Proposal>> {
    let raw = self
      .query_first(
        format!("SELECT {PROPOSAL_COLUMNS} FROM ontology_proposals WHERE proposal_id = ?1"),
        vec![uuid(proposal_id)],
        RawProposal::from_row,
      )
      .await?;
    raw.map(RawProposal::into_proposal).transpose()
  }

  async fn save_proposal(&self, proposal: Proposal) -> Result<()> {
    let changed = self
      .write_row(
        "UPDATE ontology_proposals
         SET status = ?2, reviewed = ?3, ontology = json(?4),
             finalized_schema_ids = json(?5), updated_at = ?6
         WHERE proposal_id = ?1 AND status != ?7",
        vec![
          uuid(proposal.proposal_id),
          text(proposal.status.to_string()),
          int(proposal.reviewed),
          semi(&proposal.ontology)?,
          semi(&proposal.finalized_schema_ids)?,
          text(encode_dt(proposal.updated_at)),
          text(ProposalStatus::Finalized.to_string()),
        ],
      )
      .await?;
    if changed == 0 {
      // A finalized row is frozen; tell it apart from a missing one.
      return match self.get_proposal(proposal.proposal_id).await? {
        Some(_) => Err(ontograph_core::Error::ProposalFinalized(proposal.proposal_id).into()),
        None => Err(Error::ProposalNotFound(proposal.proposal_id)),
      };
    }
    Ok(())
  }

  // ── Nodes ─────────────────────────────────────────────────────────────────

  async fn insert_node_if_absent(&self, node: NewNode) -> Result<Option<Node>> {
    let node = node.into_node();
    let changed = self
      .write_row(
        "INSERT OR IGNORE INTO nodes (
           node_id, project_id, schema_id, schema_name, node_name, normalized_name,
           structured_data, unstructured_data, vector, metadata, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        vec![
          uuid(node.node_id),
          uuid(node.project_id),
          uuid(node.schema_id),
          text(node.schema_name.as_str()),
          text(node.node_name.as_str()),
          text(node.normalized_name.as_str()),
          semi(&node.structured_data)?,
          semi(&node.unstructured_data)?,
          semi(&node.vector)?,
          semi(&node.metadata)?,
          text(encode_dt(node.created_at)),
        ],
      )
      .await?;
    Ok((changed == 1).then_some(node))
  }

  async fn find_node(
    &self,
    project_id: Uuid,
    schema_name: &str,
    normalized_name: &str,
  ) -> Result<Option<Node>> {
    let raw = self
      .query_first(
        format!(
          "SELECT {NODE_COLUMNS} FROM nodes
           WHERE project_id = ?1 AND schema_name = ?2 AND normalized_name = ?3"
        ),
        vec![uuid(project_id), text(schema_name), text(normalized_name)],
        RawNode::from_row,
      )
      .await?;
    raw.map(RawNode::into_node).transpose()
  }

  async fn get_node(&self, node_id: Uuid) -> Result<Option<Node>> {
    let raw = self
      .query_first(
        format!("SELECT {NODE_COLUMNS} FROM nodes WHERE node_id = ?1"),
        vec![uuid(node_id)],
        RawNode::from_row,
      )
      .await?;
    raw.map(RawNode::into_node).transpose()
  }

  async fn list_nodes(&self, project_id: Uuid) -> Result<Vec<Node>> {
    let raws = self
      .query_rows(
        format!("SELECT {NODE_COLUMNS} FROM nodes WHERE project_id = ?1 ORDER BY created_at, node_id"),
        vec![uuid(project_id)],
        RawNode::from_row,
      )
      .await?;
    raws.into_iter().map(RawNode::into_node).collect()
  }

  async fn count_nodes(&self, project_id: Uuid) -> Result<u64> {
    self.count("SELECT COUNT(*) FROM nodes WHERE project_id = ?1", project_id).await
  }

  async fn set_node_vector(&self, node_id: Uuid, vector: Vec<f32>) -> Result<()> {
    self
      .write_row(
        "UPDATE nodes SET vector = json(?2) WHERE node_id = ?1",
        vec![uuid(node_id), semi(&vector)?],
      )
      .await?;
    Ok(())
  }

  // ── Edges ─────────────────────────────────────────────────────────────────

  async fn insert_edge_if_absent(&self, edge: NewEdge) -> Result<Option<Edge>> {
    let edge = edge.into_edge();
    let changed = self
      .write_row(
        "INSERT OR IGNORE INTO edges (
           edge_id, project_id, schema_id, relationship_type, start_node_id,
           end_node_id, direction, properties, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        vec![
          uuid(edge.edge_id),
          uuid(edge.project_id),
          uuid(edge.schema_id),
          text(edge.relationship_type.as_str()),
          uuid(edge.start_node_id),
          uuid(edge.end_node_id),
          text(edge.direction.to_string()),
          semi(&edge.properties)?,
          text(encode_dt(edge.created_at)),
        ],
      )
      .await?;
    Ok((changed == 1).then_some(edge))
  }

  async fn find_edge(&self, project_id: Uuid, key: EdgeKey) -> Result<Option<Edge>> {
    let raw = self
      .query_first(
        format!(
          "SELECT {EDGE_COLUMNS} FROM edges
           WHERE project_id = ?1 AND start_node_id = ?2 AND end_node_id = ?3
             AND relationship_type = ?4"
        ),
        vec![
          uuid(project_id),
          uuid(key.start_node_id),
          uuid(key.end_node_id),
          text(key.relationship_type),
        ],
        RawEdge::from_row,
      )
      .await?;
    raw.map(RawEdge::into_edge).transpose()
  }

  async fn list_edges(&self, project_id: Uuid) -> Result<Vec<Edge>> {
    let raws = self
      .query_rows(
        format!("SELECT {EDGE_COLUMNS} FROM edges WHERE project_id = ?1 ORDER BY created_at, edge_id"),
        vec![uuid(project_id)],
        RawEdge::from_row,
      )
      .await?;
    raws.into_iter().map(RawEdge::into_edge).collect()
  }

  async fn count_edges(&self, project_id: Uuid) -> Result<u64> {
    self.count("SELECT COUNT(*) FROM edges WHERE project_id = ?1", project_id).await
  }
}
