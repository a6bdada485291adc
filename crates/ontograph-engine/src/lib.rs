//! The Ontograph engine: schema registry, ontology workflow, graph
//! construction and dual-store synchronization.
//!
//! Everything hangs off [`Engine`], which is generic over a
//! [`KnowledgeStore`](ontograph_core::store::KnowledgeStore) (the system of
//! record) and a [`GraphStore`](ontograph_core::store::GraphStore) (the
//! projection). Every backend call runs under the [`RetryPolicy`] timeout;
//! keyed writes are retried on transient failures.

mod engine;
mod ingest;
mod ontology;
mod registry;

pub mod error;
pub mod pipeline;
pub mod retry;
pub mod sync;

pub use engine::{Engine, EngineConfig, TeardownReport};
pub use error::{Error, Result};
pub use ingest::{EmbedFailure, EmbedReport, IngestReport};
pub use ontology::Finalized;
pub use pipeline::{BatchError, Mention, PipelineOptions, PipelineReport};
pub use registry::BreakingPolicy;
pub use retry::RetryPolicy;
pub use sync::{Mismatch, SyncConfig, SyncFailure, SyncItem, SyncResult, VerifyReport};

#[cfg(test)]
mod tests;
