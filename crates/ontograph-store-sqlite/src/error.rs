//! Error type for `ontograph-store-sqlite`.

use ontograph_core::store::Transient;
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] ontograph_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unexpected value in column {column}: {value}")]
  Decode { column: &'static str, value: String },

  /// An INSERT touching a semi-structured column could not be rewritten.
  #[error("cannot rewrite statement ({reason}); columns {columns:?}: {sql}")]
  StoreRewriteFailure {
    sql:     String,
    columns: Vec<String>,
    reason:  &'static str,
  },

  #[error("project not found: {0}")]
  ProjectNotFound(uuid::Uuid),

  #[error("proposal not found: {0}")]
  ProposalNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Transient for Error {
  /// `SQLITE_BUSY` and `SQLITE_LOCKED` clear once the competing writer
  /// finishes.
  fn is_transient(&self) -> bool {
    match self {
      Error::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))) => {
        matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
      }
      _ => false,
    }
  }
}
