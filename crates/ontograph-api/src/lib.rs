//! JSON REST API for Ontograph.
//!
//! Exposes an axum [`Router`] over an [`Engine`] backed by any
//! [`KnowledgeStore`] and [`GraphStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", ontograph_api::api_router(engine.clone()))
//! ```

pub mod error;
pub mod graph;
pub mod projects;
pub mod proposals;
pub mod schemas;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use ontograph_core::store::{GraphStore, KnowledgeStore};
use ontograph_engine::Engine;

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<K, G>(engine: Arc<Engine<K, G>>) -> Router<()>
where
  K: KnowledgeStore + 'static,
  G: GraphStore + 'static,
{
  Router::new()
    // Projects
    .route("/projects", get(projects::list::<K, G>).post(projects::create::<K, G>))
    .route(
      "/projects/{id}",
      get(projects::get_one::<K, G>).delete(projects::teardown::<K, G>),
    )
    // Schemas
    .route(
      "/projects/{id}/schemas",
      get(schemas::list::<K, G>).post(schemas::create::<K, G>),
    )
    .route(
      "/projects/{id}/schemas/{name}",
      get(schemas::get_active::<K, G>).patch(schemas::evolve::<K, G>),
    )
    .route("/projects/{id}/schemas/{name}/history", get(schemas::history::<K, G>))
    .route("/projects/{id}/schemas/{name}/validate", post(schemas::validate::<K, G>))
    // Ontology proposals
    .route("/projects/{id}/proposals", post(proposals::submit::<K, G>))
    .route(
      "/proposals/{id}",
      get(proposals::get_one::<K, G>).patch(proposals::update::<K, G>),
    )
    .route("/proposals/{id}/review", post(proposals::review::<K, G>))
    .route("/proposals/{id}/finalize", post(proposals::finalize::<K, G>))
    // Graph construction and sync
    .route("/projects/{id}/graph", post(graph::build::<K, G>))
    .route("/projects/{id}/sync", post(graph::sync::<K, G>))
    .route("/projects/{id}/verify", get(graph::verify::<K, G>))
    .with_state(engine)
}
