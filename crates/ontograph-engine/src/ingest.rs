//! Document ingestion and embeddings, built on the external seams.

use std::collections::HashMap;

use ontograph_core::{
  document::Document,
  external::{Chunker, Embedder, EntityExtractor},
  project::UsageCounter,
  schema::Schema,
  store::{GraphStore, KnowledgeStore},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Engine, Error, Result,
  pipeline::{Mention, PipelineOptions, PipelineReport},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
  pub document: Document,
  pub chunks:   usize,
  pub pipeline: PipelineReport,
}

/// A node or chunk that did not receive an embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFailure {
  pub id:     Uuid,
  pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedReport {
  pub embedded: usize,
  /// Already embedded, or of a schema without a vector configuration.
  pub skipped:  usize,
  pub failures: Vec<EmbedFailure>,
}

impl<K, G> Engine<K, G>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  /// Register a document, chunk it, store the chunks, extract entities
  /// from every chunk and run graph construction over the mentions.
  pub async fn ingest_document<C, X>(
    &self,
    project_id: Uuid,
    filename: String,
    text: &str,
    chunker: &C,
    extractor: &X,
    options: &PipelineOptions,
  ) -> Result<IngestReport>
  where
    C: Chunker,
    X: EntityExtractor,
  {
    self.get_project(project_id).await?;
    let document =
      self.store_once("add_document", self.store.add_document(project_id, filename)).await?;
    self.count_usage(project_id, UsageCounter::Documents, 1).await?;

    let pieces = chunker.chunk(document.file_id, text);
    let chunks = self.store_once("insert_chunks", self.store.insert_chunks(project_id, pieces)).await?;
    self.count_usage(project_id, UsageCounter::Chunks, chunks.len()).await?;

    let mut mentions = Vec::new();
    for chunk in &chunks {
      let entities = self
        .config
        .retry
        .once("extract_entities", extractor.extract(&chunk.text))
        .await
        .map_err(|f| f.into_external("entity extractor"))?;
      mentions.extend(entities.into_iter().map(|entity| Mention { chunk_id: chunk.chunk_id, entity }));
    }

    info!(
      %project_id,
      file_id = %document.file_id,
      chunks = chunks.len(),
      mentions = mentions.len(),
      "document chunked and extracted",
    );
    let pipeline = self.build_graph(project_id, mentions, options).await?;
    Ok(IngestReport { document, chunks: chunks.len(), pipeline })
  }

  /// Attach embeddings to the project's nodes whose schema carries a
  /// vector configuration. A vector of the wrong dimension is rejected for
  /// that node only.
  pub async fn embed_nodes<E: Embedder>(&self, project_id: Uuid, embedder: &E) -> Result<EmbedReport> {
    self.get_project(project_id).await?;
    let nodes = self.store_retry("list_nodes", || self.store.list_nodes(project_id)).await?;
    let mut schemas: HashMap<Uuid, Schema> = HashMap::new();
    let mut report = EmbedReport::default();

    for node in &nodes {
      if !schemas.contains_key(&node.schema_id) {
        let schema = self.get_schema(node.schema_id).await?;
        schemas.insert(node.schema_id, schema);
      }
      let Some(config) = schemas.get(&node.schema_id).and_then(|s| s.vector_config.as_ref()) else {
        report.skipped += 1;
        continue;
      };
      if node.vector.is_some() {
        report.skipped += 1;
        continue;
      }

      let expected = config.dimension as usize;
      let vector = match self.embed_checked(embedder, node.node_id, &node.node_name, Some(expected)).await {
        Ok(vector) => vector,
        Err(e) => {
          warn!(node_id = %node.node_id, error = %e, "node not embedded");
          report.failures.push(EmbedFailure { id: node.node_id, reason: e.to_string() });
          continue;
        }
      };
      self
        .store_retry("set_node_vector", || self.store.set_node_vector(node.node_id, vector.clone()))
        .await?;
      report.embedded += 1;
    }

    info!(%project_id, embedded = report.embedded, failed = report.failures.len(), "nodes embedded");
    Ok(report)
  }

  /// Embed every chunk of a document that has no embedding yet. All
  /// vectors of a document must share the dimension of the first one.
  pub async fn embed_chunks<E: Embedder>(&self, file_id: Uuid, embedder: &E) -> Result<EmbedReport> {
    let chunks = self.store_retry("list_chunks", || self.store.list_chunks(file_id)).await?;
    let mut dimension = chunks.iter().find_map(|c| c.embedding.as_ref().map(Vec::len));
    let mut report = EmbedReport::default();

    for chunk in &chunks {
      if chunk.embedding.is_some() {
        report.skipped += 1;
        continue;
      }
      let vector = match self.embed_checked(embedder, chunk.chunk_id, &chunk.text, dimension).await {
        Ok(vector) => vector,
        Err(e) => {
          warn!(chunk_id = %chunk.chunk_id, error = %e, "chunk not embedded");
          report.failures.push(EmbedFailure { id: chunk.chunk_id, reason: e.to_string() });
          continue;
        }
      };
      dimension.get_or_insert(vector.len());
      self
        .store_retry("set_chunk_embedding", || {
          self.store.set_chunk_embedding(chunk.chunk_id, vector.clone())
        })
        .await?;
      report.embedded += 1;
    }

    info!(%file_id, embedded = report.embedded, failed = report.failures.len(), "chunks embedded");
    Ok(report)
  }

  async fn embed_checked<E: Embedder>(
    &self,
    embedder: &E,
    id: Uuid,
    text: &str,
    expected: Option<usize>,
  ) -> Result<Vec<f32>> {
    let vector = self
      .config
      .retry
      .once("embed", embedder.embed(text))
      .await
      .map_err(|f| f.into_external("embedder"))?;
    match expected {
      Some(expected) if vector.len() != expected => {
        Err(Error::DimensionMismatch { id, expected, actual: vector.len() })
      }
      _ => Ok(vector),
    }
  }
}
