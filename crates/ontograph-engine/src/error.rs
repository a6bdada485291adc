//! Error type for `ontograph-engine`.

use std::{error::Error as StdError, time::Duration};

use thiserror::Error;
use uuid::Uuid;

type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] ontograph_core::Error),

  #[error("knowledge store error: {0}")]
  Store(#[source] BoxError),

  #[error("graph store error: {0}")]
  Graph(#[source] BoxError),

  #[error("{operation} timed out after {after:?}")]
  Timeout { operation: &'static str, after: Duration },

  /// An insert lost a uniqueness race but the winning row could not be read
  /// back.
  #[error("duplicate key race on {0} was not resolved by re-reading")]
  DuplicateKeyRace(String),

  #[error("a sync is already running for project {0}")]
  SyncInProgress(Uuid),

  #[error("project not found: {0}")]
  ProjectNotFound(Uuid),

  #[error("proposal not found: {0}")]
  ProposalNotFound(Uuid),

  #[error("{service} failed: {source}")]
  External {
    service: &'static str,
    #[source]
    source:  BoxError,
  },

  #[error("{expected}-dimensional embedding expected for {id}, got {actual}")]
  DimensionMismatch { id: Uuid, expected: usize, actual: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  pub(crate) fn store(e: impl StdError + Send + Sync + 'static) -> Self { Error::Store(Box::new(e)) }

  pub(crate) fn graph(e: impl StdError + Send + Sync + 'static) -> Self { Error::Graph(Box::new(e)) }

  pub(crate) fn external(service: &'static str, e: impl StdError + Send + Sync + 'static) -> Self {
    Error::External { service, source: Box::new(e) }
  }

  /// The domain error behind this one, if any. Backends wrap
  /// [`ontograph_core::Error`]s in their own types; this walks the source
  /// chain to find them.
  pub fn core(&self) -> Option<&ontograph_core::Error> {
    let boxed = match self {
      Error::Core(e) => return Some(e),
      Error::Store(e) | Error::Graph(e) => e,
      _ => return None,
    };
    let first: &(dyn StdError + 'static) = &**boxed;
    let mut current = Some(first);
    while let Some(err) = current {
      if let Some(core) = err.downcast_ref::<ontograph_core::Error>() {
        return Some(core);
      }
      current = err.source();
    }
    None
  }
}
