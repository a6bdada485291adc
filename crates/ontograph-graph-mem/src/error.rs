//! Error type for `ontograph-graph-mem`.

use ontograph_core::store::Transient;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// A relationship named a vertex that has not been merged.
  #[error("endpoint vertex missing: {0}")]
  MissingEndpoint(Uuid),

  #[error("vertex {node_id} is labelled {existing}, not {requested}")]
  LabelConflict {
    node_id:   Uuid,
    existing:  String,
    requested: String,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Transient for Error {
  fn is_transient(&self) -> bool { false }
}
