//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are RFC 3339 strings and UUIDs hyphenated lowercase strings.
//! Semi-structured fields go through [`ontograph_core::codec`]; they are read
//! back as whatever the driver produced, which `codec::decode` accepts
//! either way. Chunk embeddings are little-endian `f32` blobs.

use chrono::{DateTime, Utc};
use ontograph_core::{
  codec::{self, Encoded},
  document::Chunk,
  graph::{Edge, Node},
  ontology::Proposal,
  project::Project,
  schema::Schema,
  version::SemVer,
};
use rusqlite::{Row, types::Value as SqlValue};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_enum<T: std::str::FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| Error::Decode { column, value: s.to_owned() })
}

// ─── Semi-structured columns ─────────────────────────────────────────────────

/// Bind a semi-structured value as its transport text.
pub fn semi<T: serde::Serialize + ?Sized>(value: &T) -> Result<SqlValue> {
  Ok(SqlValue::Text(codec::encode(value)?))
}

/// Decode a semi-structured column from whatever the driver handed back.
pub fn decode_semi(raw: SqlValue) -> Result<serde_json::Value> {
  let value = match raw {
    SqlValue::Text(s) => codec::decode(s.as_str())?,
    SqlValue::Null => codec::decode(Encoded::Null)?,
    SqlValue::Integer(i) => codec::decode(Encoded::Native(i.into()))?,
    SqlValue::Real(f) => codec::decode(Encoded::Native(f.into()))?,
    SqlValue::Blob(b) => {
      let text = String::from_utf8(b)
        .map_err(|e| Error::Decode { column: "semi-structured", value: e.to_string() })?;
      codec::decode(text.as_str())?
    }
  };
  Ok(value)
}

pub fn decode_semi_as<T: DeserializeOwned>(raw: SqlValue) -> Result<T> {
  Ok(serde_json::from_value(decode_semi(raw)?)?)
}

// ─── Embeddings ──────────────────────────────────────────────────────────────

pub fn encode_embedding(v: &[f32]) -> Vec<u8> { v.iter().flat_map(|f| f.to_le_bytes()).collect() }

pub fn decode_embedding(b: &[u8]) -> Result<Vec<f32>> {
  if b.len() % 4 != 0 {
    return Err(Error::Decode { column: "embedding", value: format!("{} bytes", b.len()) });
  }
  Ok(
    b.chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect(),
  )
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const PROJECT_COLUMNS: &str =
  "project_id, name, status, owner, config, stats, tags, created_at";

/// Raw values read directly from a `projects` row.
pub struct RawProject {
  pub project_id: String,
  pub name:       String,
  pub status:     String,
  pub owner:      Option<String>,
  pub config:     SqlValue,
  pub stats:      SqlValue,
  pub tags:       SqlValue,
  pub created_at: String,
}

impl RawProject {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      project_id: row.get(0)?,
      name:       row.get(1)?,
      status:     row.get(2)?,
      owner:      row.get(3)?,
      config:     row.get(4)?,
      stats:      row.get(5)?,
      tags:       row.get(6)?,
      created_at: row.get(7)?,
    })
  }

  pub fn into_project(self) -> Result<Project> {
    Ok(Project {
      project_id: decode_uuid(&self.project_id)?,
      name:       self.name,
      status:     decode_enum("status", &self.status)?,
      owner:      self.owner,
      config:     decode_semi(self.config)?,
      stats:      decode_semi(self.stats)?,
      tags:       decode_semi_as(self.tags)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const SCHEMA_COLUMNS: &str = "schema_id, project_id, schema_name, kind, version_major, \
                                  version_minor, version_patch, is_active, strict, attributes, \
                                  vector_config, unstructured_config, endpoints, created_at";

pub struct RawSchema {
  pub schema_id:           String,
  pub project_id:          String,
  pub schema_name:         String,
  pub kind:                String,
  pub version:             (u32, u32, u32),
  pub is_active:           bool,
  pub strict:              bool,
  pub attributes:          SqlValue,
  pub vector_config:       SqlValue,
  pub unstructured_config: SqlValue,
  pub endpoints:           SqlValue,
  pub created_at:          String,
}

impl RawSchema {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      schema_id:           row.get(0)?,
      project_id:          row.get(1)?,
      schema_name:         row.get(2)?,
      kind:                row.get(3)?,
      version:             (row.get(4)?, row.get(5)?, row.get(6)?),
      is_active:           row.get(7)?,
      strict:              row.get(8)?,
      attributes:          row.get(9)?,
      vector_config:       row.get(10)?,
      unstructured_config: row.get(11)?,
      endpoints:           row.get(12)?,
      created_at:          row.get(13)?,
    })
  }

  pub fn into_schema(self) -> Result<Schema> {
    let (major, minor, patch) = self.version;
    Ok(Schema {
      schema_id:           decode_uuid(&self.schema_id)?,
      project_id:          decode_uuid(&self.project_id)?,
      schema_name:         self.schema_name,
      kind:                decode_enum("kind", &self.kind)?,
      version:             SemVer::new(major, minor, patch),
      is_active:           self.is_active,
      strict:              self.strict,
      attributes:          decode_semi_as(self.attributes)?,
      vector_config:       decode_semi_as(self.vector_config)?,
      unstructured_config: decode_semi_as(self.unstructured_config)?,
      endpoints:           decode_semi_as(self.endpoints)?,
      created_at:          decode_dt(&self.created_at)?,
    })
  }
}

pub const CHUNK_COLUMNS: &str =
  "chunk_id, file_id, project_id, chunk_index, char_start, char_end, text, embedding";

pub struct RawChunk {
  pub chunk_id:    String,
  pub file_id:     String,
  pub project_id:  String,
  pub chunk_index: u32,
  pub char_start:  i64,
  pub char_end:    i64,
  pub text:        String,
  pub embedding:   Option<Vec<u8>>,
}

impl RawChunk {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      chunk_id:    row.get(0)?,
      file_id:     row.get(1)?,
      project_id:  row.get(2)?,
      chunk_index: row.get(3)?,
      char_start:  row.get(4)?,
      char_end:    row.get(5)?,
      text:        row.get(6)?,
      embedding:   row.get(7)?,
    })
  }

  pub fn into_chunk(self) -> Result<Chunk> {
    let offset = |column, v: i64| {
      usize::try_from(v).map_err(|_| Error::Decode { column, value: v.to_string() })
    };
    Ok(Chunk {
      chunk_id:    decode_uuid(&self.chunk_id)?,
      file_id:     decode_uuid(&self.file_id)?,
      project_id:  decode_uuid(&self.project_id)?,
      chunk_index: self.chunk_index,
      char_start:  offset("char_start", self.char_start)?,
      char_end:    offset("char_end", self.char_end)?,
      text:        self.text,
      embedding:   self.embedding.as_deref().map(decode_embedding).transpose()?,
    })
  }
}

pub const NODE_COLUMNS: &str = "node_id, project_id, schema_id, schema_name, node_name, \
                                normalized_name, structured_data, unstructured_data, vector, \
                                metadata, created_at";

pub struct RawNode {
  pub node_id:           String,
  pub project_id:        String,
  pub schema_id:         String,
  pub schema_name:       String,
  pub node_name:         String,
  pub normalized_name:   String,
  pub structured_data:   SqlValue,
  pub unstructured_data: SqlValue,
  pub vector:            SqlValue,
  pub metadata:          SqlValue,
  pub created_at:        String,
}

impl RawNode {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      node_id:           row.get(0)?,
      project_id:        row.get(1)?,
      schema_id:         row.get(2)?,
      schema_name:       row.get(3)?,
      node_name:         row.get(4)?,
      normalized_name:   row.get(5)?,
      structured_data:   row.get(6)?,
      unstructured_data: row.get(7)?,
      vector:            row.get(8)?,
      metadata:          row.get(9)?,
      created_at:        row.get(10)?,
    })
  }

  pub fn into_node(self) -> Result<Node> {
    Ok(Node {
      node_id:           decode_uuid(&self.node_id)?,
      project_id:        decode_uuid(&self.project_id)?,
      schema_id:         decode_uuid(&self.schema_id)?,
      schema_name:       self.schema_name,
      node_name:         self.node_name,
      normalized_name:   self.normalized_name,
      structured_data:   decode_semi(self.structured_data)?,
      unstructured_data: decode_semi(self.unstructured_data)?,
      vector:            decode_semi_as(self.vector)?,
      metadata:          decode_semi(self.metadata)?,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

pub const EDGE_COLUMNS: &str = "edge_id, project_id, schema_id, relationship_type, \
                                start_node_id, end_node_id, direction, properties, created_at";

pub struct RawEdge {
  pub edge_id:           String,
  pub project_id:        String,
  pub schema_id:         String,
  pub relationship_type: String,
  pub start_node_id:     String,
  pub end_node_id:       String,
  pub direction:         String,
  pub properties:        SqlValue,
  pub created_at:        String,
}

impl RawEdge {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      edge_id:           row.get(0)?,
      project_id:        row.get(1)?,
      schema_id:         row.get(2)?,
      relationship_type: row.get(3)?,
      start_node_id:     row.get(4)?,
      end_node_id:       row.get(5)?,
      direction:         row.get(6)?,
      properties:        row.get(7)?,
      created_at:        row.get(8)?,
    })
  }

  pub fn into_edge(self) -> Result<Edge> {
    Ok(Edge {
      edge_id:           decode_uuid(&self.edge_id)?,
      project_id:        decode_uuid(&self.project_id)?,
      schema_id:         decode_uuid(&self.schema_id)?,
      relationship_type: self.relationship_type,
      start_node_id:     decode_uuid(&self.start_node_id)?,
      end_node_id:       decode_uuid(&self.end_node_id)?,
      direction:         decode_enum("direction", &self.direction)?,
      properties:        decode_semi(self.properties)?,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

pub const PROPOSAL_COLUMNS: &str = "proposal_id, project_id, status, reviewed, ontology, \
                                    finalized_schema_ids, created_at, updated_at";

pub struct RawProposal {
  pub proposal_id:          String,
  pub project_id:           String,
  pub status:               String,
  pub reviewed:             bool,
  pub ontology:             SqlValue,
  pub finalized_schema_ids: SqlValue,
  pub created_at:           String,
  pub updated_at:           String,
}

impl RawProposal {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      proposal_id:          row.get(0)?,
      project_id:           row.get(1)?,
      status:               row.get(2)?,
      reviewed:             row.get(3)?,
      ontology:             row.get(4)?,
      finalized_schema_ids: row.get(5)?,
      created_at:           row.get(6)?,
      updated_at:           row.get(7)?,
    })
  }

  pub fn into_proposal(self) -> Result<Proposal> {
    Ok(Proposal {
      proposal_id:          decode_uuid(&self.proposal_id)?,
      project_id:           decode_uuid(&self.project_id)?,
      status:               decode_enum("status", &self.status)?,
      reviewed:             self.reviewed,
      ontology:             decode_semi_as(self.ontology)?,
      finalized_schema_ids: decode_semi_as(self.finalized_schema_ids)?,
      created_at:           decode_dt(&self.created_at)?,
      updated_at:           decode_dt(&self.updated_at)?,
    })
  }
}
