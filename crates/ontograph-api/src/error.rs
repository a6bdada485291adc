//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use ontograph_core::{Error as CoreError, validate::ValidationError};
use ontograph_engine::Error as EngineError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// A payload failed schema validation; every violation is reported.
  #[error(transparent)]
  Invalid(ValidationError),

  #[error("upstream failure: {0}")]
  Upstream(String),

  #[error("timed out: {0}")]
  Timeout(String),

  #[error("engine error: {0}")]
  Engine(#[source] EngineError),
}

impl From<EngineError> for ApiError {
  fn from(e: EngineError) -> Self {
    match &e {
      EngineError::ProjectNotFound(_) | EngineError::ProposalNotFound(_) => {
        return ApiError::NotFound(e.to_string());
      }
      EngineError::SyncInProgress(_) | EngineError::DuplicateKeyRace(_) => {
        return ApiError::Conflict(e.to_string());
      }
      EngineError::DimensionMismatch { .. } => return ApiError::BadRequest(e.to_string()),
      EngineError::External { .. } => return ApiError::Upstream(e.to_string()),
      EngineError::Timeout { .. } => return ApiError::Timeout(e.to_string()),
      _ => {}
    }

    match e.core() {
      Some(CoreError::Validation(v)) => ApiError::Invalid(v.clone()),
      Some(CoreError::SchemaNotFound(_)) => ApiError::NotFound(e.to_string()),
      Some(
        CoreError::SchemaInactive(_)
        | CoreError::SchemaKindConflict { .. }
        | CoreError::ActiveSchemaExists(_)
        | CoreError::ProposalFinalized(_)
        | CoreError::ProposalNotReviewed(_)
        | CoreError::DuplicateType(_)
        | CoreError::DuplicateAttribute { .. }
        | CoreError::TypeInUse { .. },
      ) => ApiError::Conflict(e.to_string()),
      Some(
        CoreError::InvalidSchemaName { .. }
        | CoreError::InvalidVersion(_)
        | CoreError::UnknownAttribute { .. }
        | CoreError::UnknownType(_)
        | CoreError::Codec(_),
      ) => ApiError::BadRequest(e.to_string()),
      None => ApiError::Engine(e),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Invalid(v) => {
        let violations: Vec<_> = v
          .violations
          .iter()
          .map(|violation| {
            json!({ "attribute": violation.attribute, "problem": violation.problem.to_string() })
          })
          .collect();
        let body = json!({
          "error":      v.to_string(),
          "schema":     v.schema_name,
          "version":    v.version,
          "violations": violations,
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
      }
      ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, m.clone()),
      ApiError::Timeout(m) => (StatusCode::GATEWAY_TIMEOUT, m.clone()),
      ApiError::Engine(e) => {
        error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
