//! Handlers for `/projects` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/projects` | All projects |
//! | `POST`   | `/projects` | Body: [`NewProject`]; returns 201 |
//! | `GET`    | `/projects/:id` | 404 if not found |
//! | `DELETE` | `/projects/:id` | Removes the project from both stores |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use ontograph_core::{
  project::{NewProject, Project},
  store::{GraphStore, KnowledgeStore},
};
use ontograph_engine::{Engine, TeardownReport};
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /projects`
pub async fn list<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
) -> Result<Json<Vec<Project>>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  Ok(Json(engine.list_projects().await?))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /projects` with body `{"name":"...","owner":"...","tags":[...]}`
pub async fn create<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Json(body): Json<NewProject>,
) -> Result<impl IntoResponse, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  if body.name.trim().is_empty() {
    return Err(ApiError::BadRequest("project name must not be empty".into()));
  }
  let project = engine.create_project(body).await?;
  Ok((StatusCode::CREATED, Json(project)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /projects/:id`
pub async fn get_one<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Project>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  Ok(Json(engine.get_project(id).await?))
}

// ─── Teardown ─────────────────────────────────────────────────────────────────

/// `DELETE /projects/:id`
pub async fn teardown<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<TeardownReport>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  Ok(Json(engine.teardown_project(id).await?))
}
