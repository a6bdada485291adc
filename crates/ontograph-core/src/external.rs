//! Seams for the collaborators that live outside this system: the chunker,
//! the entity extractor, the ontology proposal generator and the embedding
//! service.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{document::NewChunk, ontology::OntologyDraft, schema::UnstructuredConfig};

// ─── Chunking ────────────────────────────────────────────────────────────────

/// Splits a document into chunks, in document order.
pub trait Chunker: Send + Sync {
  fn chunk(&self, file_id: Uuid, text: &str) -> Vec<NewChunk>;
}

/// Fixed-size character windows with overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowChunker {
  chunk_size:    usize,
  chunk_overlap: usize,
}

impl WindowChunker {
  /// `chunk_size` is at least 1 and the overlap is kept below it.
  pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
    let chunk_size = chunk_size.max(1);
    Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
  }
}

impl Default for WindowChunker {
  fn default() -> Self { UnstructuredConfig::default().into() }
}

impl From<UnstructuredConfig> for WindowChunker {
  fn from(cfg: UnstructuredConfig) -> Self { Self::new(cfg.chunk_size, cfg.chunk_overlap) }
}

impl Chunker for WindowChunker {
  fn chunk(&self, file_id: Uuid, text: &str) -> Vec<NewChunk> {
    let chars: Vec<char> = text.chars().collect();
    let step = self.chunk_size - self.chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
      let end = (start + self.chunk_size).min(chars.len());
      chunks.push(NewChunk {
        file_id,
        text: chars[start..end].iter().collect(),
        char_start: start,
        char_end: end,
      });
      if end == chars.len() {
        break;
      }
      start += step;
    }
    chunks
  }
}

// ─── Extraction ──────────────────────────────────────────────────────────────

/// Character offsets of a mention within its chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
  pub start: usize,
  pub end:   usize,
}

/// One entity mention returned by an [`EntityExtractor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
  pub type_label:   String,
  pub surface_text: String,
  /// Opaque to this system; carried into node metadata.
  #[serde(default)]
  pub confidence:   f32,
  #[serde(default)]
  pub span:         Option<Span>,
}

pub trait EntityExtractor: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn extract<'a>(
    &'a self,
    text: &'a str,
  ) -> impl Future<Output = Result<Vec<ExtractedEntity>, Self::Error>> + Send + 'a;
}

// ─── Ontology proposals ──────────────────────────────────────────────────────

pub trait OntologyProposer: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn propose<'a>(
    &'a self,
    snippets: &'a [String],
  ) -> impl Future<Output = Result<OntologyDraft, Self::Error>> + Send + 'a;
}

// ─── Embeddings ──────────────────────────────────────────────────────────────

/// Returns a fixed-dimension vector for a piece of text.
pub trait Embedder: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn embed<'a>(
    &'a self,
    text: &'a str,
  ) -> impl Future<Output = Result<Vec<f32>, Self::Error>> + Send + 'a;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn windows_overlap_and_cover_the_text() {
    let chunker = WindowChunker::new(4, 1);
    let chunks = chunker.chunk(Uuid::nil(), "abcdefghij");
    let spans: Vec<_> = chunks.iter().map(|c| (c.char_start, c.char_end)).collect();
    assert_eq!(spans, [(0, 4), (3, 7), (6, 10)]);
    assert_eq!(chunks[1].text, "defg");
  }

  #[test]
  fn offsets_count_characters_not_bytes() {
    let chunks = WindowChunker::new(2, 0).chunk(Uuid::nil(), "äöü");
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, "äö");
    assert_eq!((chunks[1].char_start, chunks[1].char_end), (2, 3));
  }

  #[test]
  fn degenerate_parameters_are_clamped() {
    let chunker = WindowChunker::new(0, 5);
    assert_eq!(chunker.chunk(Uuid::nil(), "ab").len(), 2);
    assert!(WindowChunker::default().chunk(Uuid::nil(), "").is_empty());
  }
}
