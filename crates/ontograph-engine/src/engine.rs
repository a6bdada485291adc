//! The `Engine`: one handle over a knowledge store and a graph store.
//!
//! The schema registry, the ontology workflow, the graph construction
//! pipeline and the synchronizer are all `impl` blocks on [`Engine`], spread
//! over the sibling modules.

use std::{future::Future, sync::Arc};

use dashmap::DashMap;
use ontograph_core::{
  project::{NewProject, Project},
  store::{GraphStore, KnowledgeStore},
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::{
  Error, Result,
  pipeline::PipelineOptions,
  retry::RetryPolicy,
  sync::SyncConfig,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub retry:    RetryPolicy,
  pub sync:     SyncConfig,
  pub pipeline: PipelineOptions,
}

/// Counts from removing a project from both stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
  pub project_id:       Uuid,
  pub vertices_removed: u64,
}

pub struct Engine<K, G> {
  pub(crate) store:      Arc<K>,
  pub(crate) graph:      Arc<G>,
  pub(crate) config:     EngineConfig,
  /// One lock per project, held for the duration of a sync.
  pub(crate) sync_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl<K, G> Engine<K, G>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  pub fn new(store: Arc<K>, graph: Arc<G>, config: EngineConfig) -> Self {
    Self { store, graph, config, sync_locks: DashMap::new() }
  }

  pub fn store(&self) -> &Arc<K> { &self.store }

  pub fn graph(&self) -> &Arc<G> { &self.graph }

  pub fn config(&self) -> &EngineConfig { &self.config }

  // ── Guarded calls ─────────────────────────────────────────────────────────

  pub(crate) async fn store_once<T, Fut>(&self, operation: &'static str, call: Fut) -> Result<T>
  where
    Fut: Future<Output = Result<T, K::Error>>,
  {
    self.config.retry.once(operation, call).await.map_err(|f| f.into_store())
  }

  pub(crate) async fn store_retry<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, K::Error>>,
  {
    self.config.retry.idempotent(operation, call).await.map_err(|f| f.into_store())
  }

  pub(crate) async fn graph_retry<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, G::Error>>,
  {
    self.config.retry.idempotent(operation, call).await.map_err(|f| f.into_graph())
  }

  pub(crate) fn sync_lock(&self, project_id: Uuid) -> Arc<Mutex<()>> {
    self.sync_locks.entry(project_id).or_default().value().clone()
  }

  // ── Projects ──────────────────────────────────────────────────────────────

  pub async fn create_project(&self, input: NewProject) -> Result<Project> {
    let project = self.store_once("create_project", self.store.create_project(input)).await?;
    info!(project_id = %project.project_id, name = %project.name, "project created");
    Ok(project)
  }

  pub async fn get_project(&self, project_id: Uuid) -> Result<Project> {
    self
      .store_retry("get_project", || self.store.get_project(project_id))
      .await?
      .ok_or(Error::ProjectNotFound(project_id))
  }

  pub async fn list_projects(&self) -> Result<Vec<Project>> {
    self.store_retry("list_projects", || self.store.list_projects()).await
  }

  /// Remove a project from the graph store and then from the relational
  /// store. Waits for a running sync of the project to finish first.
  pub async fn teardown_project(&self, project_id: Uuid) -> Result<TeardownReport> {
    self.get_project(project_id).await?;
    let lock = self.sync_lock(project_id);
    let _guard = lock.lock().await;

    let vertices_removed = self
      .graph_retry("detach_delete_project", || self.graph.detach_delete_project(project_id))
      .await?;
    let removed = self
      .store_once("teardown_project", self.store.teardown_project(project_id))
      .await?;
    if !removed {
      return Err(Error::ProjectNotFound(project_id));
    }
    self.sync_locks.remove(&project_id);

    info!(%project_id, vertices_removed, "project torn down");
    Ok(TeardownReport { project_id, vertices_removed })
  }
}
