//! Documents and their chunks. Chunks are read-only input to extraction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  pub file_id:    Uuid,
  pub project_id: Uuid,
  pub filename:   String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
  pub chunk_id:    Uuid,
  pub file_id:     Uuid,
  pub project_id:  Uuid,
  /// Position of the chunk in document order.
  pub chunk_index: u32,
  /// Character (not byte) offsets into the source document.
  pub char_start:  usize,
  pub char_end:    usize,
  pub text:        String,
  pub embedding:   Option<Vec<f32>>,
}

/// A chunk as produced by a [`Chunker`](crate::external::Chunker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChunk {
  pub file_id:    Uuid,
  pub text:       String,
  pub char_start: usize,
  pub char_end:   usize,
}

impl NewChunk {
  pub fn into_chunk(self, project_id: Uuid, chunk_index: u32) -> Chunk {
    Chunk {
      chunk_id: Uuid::new_v4(),
      file_id: self.file_id,
      project_id,
      chunk_index,
      char_start: self.char_start,
      char_end: self.char_end,
      text: self.text,
      embedding: None,
    }
  }
}
