//! Error types for `ontograph-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::{schema::SchemaKind, validate::ValidationError};

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error("schema not found: {0}")]
  SchemaNotFound(String),

  #[error("schema {0} is no longer active")]
  SchemaInactive(Uuid),

  #[error("schema {name:?} is a {existing} schema, not {requested}")]
  SchemaKindConflict {
    name:      String,
    existing:  SchemaKind,
    requested: SchemaKind,
  },

  #[error("an active schema named {0:?} already exists")]
  ActiveSchemaExists(String),

  #[error("invalid schema name {name:?}: {reason}")]
  InvalidSchemaName { name: String, reason: &'static str },

  #[error("invalid version string: {0:?}")]
  InvalidVersion(String),

  #[error("schema {schema:?} has no attribute {attribute:?}")]
  UnknownAttribute { schema: String, attribute: String },

  #[error("schema {schema:?} already defines attribute {attribute:?}")]
  DuplicateAttribute { schema: String, attribute: String },

  #[error("proposal {0} is finalized and can no longer change")]
  ProposalFinalized(Uuid),

  #[error("proposal {0} has not been reviewed; review or edit it before finalizing")]
  ProposalNotReviewed(Uuid),

  #[error("unknown type in ontology: {0:?}")]
  UnknownType(String),

  #[error("type {0:?} is already defined in this ontology")]
  DuplicateType(String),

  #[error("node type {schema_name:?} is still referenced by edge type {edge:?}")]
  TypeInUse { schema_name: String, edge: String },

  #[error("codec error: {0}")]
  Codec(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
