//! Handlers for graph construction and dual-store sync.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/projects/:id/graph` | Body: [`BuildBody`]; returns the batch report |
//! | `POST` | `/projects/:id/sync` | 409 if a sync of the project is running |
//! | `GET`  | `/projects/:id/verify` | Count comparison plus a sampled payload check |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use ontograph_core::store::{GraphStore, KnowledgeStore};
use ontograph_engine::{Engine, Mention, PipelineOptions, PipelineReport, SyncResult, VerifyReport};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── Build ────────────────────────────────────────────────────────────────────

/// An already-extracted batch of mentions.
#[derive(Debug, Deserialize)]
pub struct BuildBody {
  pub mentions: Vec<Mention>,
  /// Overrides the server's configured relationship type and direction.
  #[serde(default)]
  pub options:  Option<PipelineOptions>,
}

/// `POST /projects/:id/graph`
pub async fn build<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path(project_id): Path<Uuid>,
  Json(body): Json<BuildBody>,
) -> Result<Json<PipelineReport>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  let options = body.options.unwrap_or_else(|| engine.config().pipeline.clone());
  let report = engine.build_graph(project_id, body.mentions, &options).await?;
  Ok(Json(report))
}

// ─── Sync ─────────────────────────────────────────────────────────────────────

/// `POST /projects/:id/sync`
///
/// Row-level failures are part of the 200 response, not an error status.
pub async fn sync<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path(project_id): Path<Uuid>,
) -> Result<Json<SyncResult>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  Ok(Json(engine.sync(project_id).await?))
}

// ─── Verify ───────────────────────────────────────────────────────────────────

/// `GET /projects/:id/verify`
pub async fn verify<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path(project_id): Path<Uuid>,
) -> Result<Json<VerifyReport>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  Ok(Json(engine.verify(project_id).await?))
}
