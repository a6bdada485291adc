//! Handlers for the ontology workflow.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `POST`  | `/projects/:id/proposals` | Body: an ontology draft; returns 201 |
//! | `GET`   | `/proposals/:id` | 404 if not found |
//! | `PATCH` | `/proposals/:id` | Body: `{"edits":[...]}`; all or nothing |
//! | `POST`  | `/proposals/:id/review` | Marks the draft as reviewed |
//! | `POST`  | `/proposals/:id/finalize` | Creates the schemas; idempotent |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use ontograph_core::{
  ontology::{OntologyDraft, OntologyEdit, Proposal},
  store::{GraphStore, KnowledgeStore},
};
use ontograph_engine::{Engine, Finalized};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── Submit ───────────────────────────────────────────────────────────────────

/// `POST /projects/:id/proposals` with body `{"nodes":[...],"edges":[...]}`
pub async fn submit<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path(project_id): Path<Uuid>,
  Json(draft): Json<OntologyDraft>,
) -> Result<impl IntoResponse, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  let proposal = engine.submit(project_id, draft).await?;
  Ok((StatusCode::CREATED, Json(proposal)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /proposals/:id`
pub async fn get_one<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Proposal>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  Ok(Json(engine.get_proposal(id).await?))
}

// ─── Update ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
  pub edits: Vec<OntologyEdit>,
}

/// `PATCH /proposals/:id`
pub async fn update<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<UpdateBody>,
) -> Result<Json<Proposal>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  Ok(Json(engine.update(id, &body.edits).await?))
}

// ─── Review ───────────────────────────────────────────────────────────────────

/// `POST /proposals/:id/review`
pub async fn review<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Proposal>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  Ok(Json(engine.review(id).await?))
}

// ─── Finalize ─────────────────────────────────────────────────────────────────

/// `POST /proposals/:id/finalize`
pub async fn finalize<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Finalized>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  Ok(Json(engine.finalize(id).await?))
}
