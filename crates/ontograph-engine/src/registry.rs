//! The schema registry: versioned type definitions per project.
//!
//! Version rows are append-only. A new definition is diffed against the
//! active row of its name; the size of the change decides the version bump,
//! and a breaking change either supersedes the active row or forks into a
//! new name. Nodes stay pinned to the row they were created under.

use ontograph_core::{
  schema::{Schema, SchemaDefinition, SchemaEdit, SchemaKind, classify_change, validate_schema_name},
  store::{GraphStore, KnowledgeStore, UpsertOutcome},
  validate::validate_payload,
  version::{SemVer, VersionBump},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{Engine, Result};

/// How often the read-classify-write cycle of [`Engine::create_schema`] is
/// repeated when a concurrent writer moves the active row underneath it.
const SUPERSEDE_ATTEMPTS: usize = 4;

/// What to do with the active version when a change is breaking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakingPolicy {
  /// Deactivate the previous version.
  #[default]
  Supersede,
  /// Keep the previous version active and start the new major version
  /// under another name.
  Fork { name: String },
}

impl<K, G> Engine<K, G>
where
  K: KnowledgeStore,
  G: GraphStore,
{
  /// Create a schema, or a new version of it.
  ///
  /// The first definition of a name starts at 1.0.0. An identical
  /// definition returns the active row unchanged.
  pub async fn create_schema(
    &self,
    project_id: Uuid,
    definition: SchemaDefinition,
    policy: &BreakingPolicy,
  ) -> Result<Schema> {
    validate_schema_name(&definition.name)?;
    self.get_project(project_id).await?;

    let mut last_seen = None;
    for _ in 0..SUPERSEDE_ATTEMPTS {
      let active = self.active_schema(project_id, &definition.name).await?;

      let Some(active) = active else {
        let fresh = Schema::from_definition(project_id, definition.clone(), SemVer::INITIAL);
        let (schema, outcome) =
          self.store_retry("insert_schema", || self.store.insert_schema(fresh.clone())).await?;
        if outcome == UpsertOutcome::Created {
          info!(%project_id, schema = %schema.schema_name, version = %schema.version, "schema created");
          return Ok(schema);
        }
        // Somebody else created the name first; classify against theirs.
        continue;
      };

      let bump = classify_change(&active.definition(), &definition)?;
      if bump == VersionBump::None {
        return Ok(active);
      }

      if let (VersionBump::Major, BreakingPolicy::Fork { name }) = (bump, policy) {
        return self.fork_schema(&active, definition, name).await;
      }

      let next = Schema::from_definition(project_id, definition.clone(), active.version.bump(bump)?);
      match self.store_once("supersede_schema", self.store.supersede_schema(active.schema_id, next)).await {
        Ok(schema) => {
          info!(
            %project_id,
            schema = %schema.schema_name,
            from = %active.version,
            to = %schema.version,
            ?bump,
            "schema version created",
          );
          return Ok(schema);
        }
        Err(e) if matches!(e.core(), Some(ontograph_core::Error::SchemaInactive(_))) => {
          warn!(%project_id, schema = %definition.name, "active schema moved concurrently, retrying");
          last_seen = Some(active.schema_id);
        }
        Err(e) => return Err(e),
      }
    }

    Err(match last_seen {
      Some(id) => ontograph_core::Error::SchemaInactive(id).into(),
      None => ontograph_core::Error::SchemaNotFound(definition.name).into(),
    })
  }

  async fn fork_schema(
    &self,
    active: &Schema,
    definition: SchemaDefinition,
    name: &str,
  ) -> Result<Schema> {
    validate_schema_name(name)?;
    let project_id = active.project_id;
    if self.active_schema(project_id, name).await?.is_some() {
      return Err(ontograph_core::Error::ActiveSchemaExists(name.to_owned()).into());
    }

    let forked = SchemaDefinition { name: name.to_owned(), ..definition };
    let schema =
      Schema::from_definition(project_id, forked, active.version.bump(VersionBump::Major)?);
    let (schema, outcome) =
      self.store_retry("insert_schema", || self.store.insert_schema(schema.clone())).await?;
    if outcome == UpsertOutcome::Existing {
      return Err(ontograph_core::Error::ActiveSchemaExists(name.to_owned()).into());
    }

    info!(
      %project_id,
      from = %active.schema_name,
      to = %schema.schema_name,
      version = %schema.version,
      "schema forked",
    );
    Ok(schema)
  }

  /// Apply attribute edits to the active definition of `name` and register
  /// the result as a new version.
  pub async fn evolve_schema(
    &self,
    project_id: Uuid,
    name: &str,
    edits: &[SchemaEdit],
    policy: &BreakingPolicy,
  ) -> Result<Schema> {
    let mut definition = self.get_active_schema(project_id, name).await?.definition();
    for edit in edits {
      definition.apply(edit)?;
    }
    self.create_schema(project_id, definition, policy).await
  }

  /// The active schema of `name`, created empty and non-strict if the
  /// project has none yet. Safe against concurrent callers.
  pub async fn ensure_schema(&self, project_id: Uuid, name: &str, kind: SchemaKind) -> Result<Schema> {
    validate_schema_name(name)?;
    let schema = match self.active_schema(project_id, name).await? {
      Some(schema) => schema,
      None => {
        let fresh =
          Schema::from_definition(project_id, SchemaDefinition::new(name, kind), SemVer::INITIAL);
        let (schema, outcome) =
          self.store_retry("insert_schema", || self.store.insert_schema(fresh.clone())).await?;
        if outcome == UpsertOutcome::Created {
          info!(%project_id, schema = %name, %kind, "schema created on first use");
        }
        schema
      }
    };

    if schema.kind != kind {
      return Err(
        ontograph_core::Error::SchemaKindConflict {
          name:      name.to_owned(),
          existing:  schema.kind,
          requested: kind,
        }
        .into(),
      );
    }
    Ok(schema)
  }

  async fn active_schema(&self, project_id: Uuid, name: &str) -> Result<Option<Schema>> {
    self.store_retry("get_active_schema", || self.store.get_active_schema(project_id, name)).await
  }

  pub async fn get_active_schema(&self, project_id: Uuid, name: &str) -> Result<Schema> {
    self
      .active_schema(project_id, name)
      .await?
      .ok_or_else(|| ontograph_core::Error::SchemaNotFound(name.to_owned()).into())
  }

  pub async fn get_schema(&self, schema_id: Uuid) -> Result<Schema> {
    self
      .store_retry("get_schema", || self.store.get_schema(schema_id))
      .await?
      .ok_or_else(|| ontograph_core::Error::SchemaNotFound(schema_id.to_string()).into())
  }

  pub async fn list_schemas(&self, project_id: Uuid, active_only: bool) -> Result<Vec<Schema>> {
    self.get_project(project_id).await?;
    self.store_retry("list_schemas", || self.store.list_schemas(project_id, active_only)).await
  }

  /// Every version of `name`, oldest first.
  pub async fn schema_history(&self, project_id: Uuid, name: &str) -> Result<Vec<Schema>> {
    self.store_retry("schema_history", || self.store.schema_history(project_id, name)).await
  }

  /// Validate `data` against the active version of `name`, returning the
  /// coerced payload.
  pub async fn validate(&self, project_id: Uuid, name: &str, data: &Value) -> Result<Value> {
    let schema = self.get_active_schema(project_id, name).await?;
    Ok(validate_payload(&schema, data).map_err(ontograph_core::Error::from)?)
  }

  /// Validate `data` against one specific version, active or not.
  pub async fn validate_pinned(&self, schema_id: Uuid, data: &Value) -> Result<Value> {
    let schema = self.get_schema(schema_id).await?;
    Ok(validate_payload(&schema, data).map_err(ontograph_core::Error::from)?)
  }
}
