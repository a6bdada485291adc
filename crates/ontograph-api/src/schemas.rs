//! Handlers for the schema registry.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/projects/:id/schemas` | Active schemas; `?include_inactive=true` for all versions |
//! | `POST`  | `/projects/:id/schemas` | Body: [`CreateBody`]; returns 201 + the active version |
//! | `GET`   | `/projects/:id/schemas/:name` | The active version |
//! | `PATCH` | `/projects/:id/schemas/:name` | Body: [`EvolveBody`] |
//! | `GET`   | `/projects/:id/schemas/:name/history` | Every version, oldest first |
//! | `POST`  | `/projects/:id/schemas/:name/validate` | Body: the payload; returns it normalized |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use ontograph_core::{
  schema::{Schema, SchemaDefinition, SchemaEdit},
  store::{GraphStore, KnowledgeStore},
};
use ontograph_engine::{BreakingPolicy, Engine};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Also return superseded versions. Default `false`.
  #[serde(default)]
  pub include_inactive: bool,
}

/// `GET /projects/:id/schemas[?include_inactive=true]`
pub async fn list<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path(project_id): Path<Uuid>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Schema>>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  let schemas = engine.list_schemas(project_id, !params.include_inactive).await?;
  Ok(Json(schemas))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /projects/:id/schemas`.
#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub definition: SchemaDefinition,
  /// Applied when the definition is a breaking change of the active version.
  #[serde(default)]
  pub policy:     BreakingPolicy,
}

/// `POST /projects/:id/schemas`
///
/// Creates version 1.0.0, a new version of an existing schema, or returns
/// the active version unchanged when the definition is identical.
pub async fn create<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path(project_id): Path<Uuid>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  let schema = engine.create_schema(project_id, body.definition, &body.policy).await?;
  Ok((StatusCode::CREATED, Json(schema)))
}

// ─── Get active ───────────────────────────────────────────────────────────────

/// `GET /projects/:id/schemas/:name`
pub async fn get_active<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path((project_id, name)): Path<(Uuid, String)>,
) -> Result<Json<Schema>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  Ok(Json(engine.get_active_schema(project_id, &name).await?))
}

// ─── Evolve ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `PATCH /projects/:id/schemas/:name`.
#[derive(Debug, Deserialize)]
pub struct EvolveBody {
  pub edits:  Vec<SchemaEdit>,
  #[serde(default)]
  pub policy: BreakingPolicy,
}

/// `PATCH /projects/:id/schemas/:name`
pub async fn evolve<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path((project_id, name)): Path<(Uuid, String)>,
  Json(body): Json<EvolveBody>,
) -> Result<Json<Schema>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  let schema = engine.evolve_schema(project_id, &name, &body.edits, &body.policy).await?;
  Ok(Json(schema))
}

// ─── History ──────────────────────────────────────────────────────────────────

/// `GET /projects/:id/schemas/:name/history`
pub async fn history<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path((project_id, name)): Path<(Uuid, String)>,
) -> Result<Json<Vec<Schema>>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  let versions = engine.schema_history(project_id, &name).await?;
  if versions.is_empty() {
    return Err(ApiError::NotFound(format!("schema {name:?} not found")));
  }
  Ok(Json(versions))
}

// ─── Validate ─────────────────────────────────────────────────────────────────

/// `POST /projects/:id/schemas/:name/validate`
///
/// Validates against the active version. A failing payload is answered with
/// 422 and the full list of violations.
pub async fn validate<K, G>(
  State(engine): State<Arc<Engine<K, G>>>,
  Path((project_id, name)): Path<(Uuid, String)>,
  Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  Ok(Json(engine.validate(project_id, &name, &payload).await?))
}
