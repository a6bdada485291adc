//! Projects: the tenant-scoped container that owns every other record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProjectStatus {
  #[default]
  Active,
  Archived,
}

/// Usage counters kept in `Project::stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum UsageCounter {
  Documents,
  Chunks,
  Nodes,
  Edges,
  Syncs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
  pub project_id: Uuid,
  pub name:       String,
  pub status:     ProjectStatus,
  pub owner:      Option<String>,
  pub config:     Value,
  pub stats:      Value,
  pub tags:       Vec<String>,
  pub created_at: DateTime<Utc>,
}

impl Project {
  /// Read a usage counter; absent counters read as zero.
  pub fn usage(&self, counter: UsageCounter) -> u64 {
    let key: &str = counter.as_ref();
    self.stats.get(key).and_then(Value::as_u64).unwrap_or(0)
  }
}

/// Input to [`KnowledgeStore::create_project`](crate::store::KnowledgeStore::create_project).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProject {
  pub name:   String,
  #[serde(default)]
  pub owner:  Option<String>,
  #[serde(default)]
  pub config: Option<Value>,
  #[serde(default)]
  pub tags:   Vec<String>,
}

impl NewProject {
  pub fn named(name: impl Into<String>) -> Self { Self { name: name.into(), ..Self::default() } }

  /// Materialise the row the store will insert.
  pub fn into_project(self) -> Project {
    Project {
      project_id: Uuid::new_v4(),
      name:       self.name,
      status:     ProjectStatus::Active,
      owner:      self.owner,
      config:     self.config.unwrap_or_else(|| Value::Object(Map::new())),
      stats:      Value::Object(Map::new()),
      tags:       self.tags,
      created_at: Utc::now(),
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn new_project_starts_active_with_empty_stats() {
    let project = NewProject::named("papers").into_project();
    assert_eq!(project.status, ProjectStatus::Active);
    assert_eq!(project.stats, json!({}));
    assert_eq!(project.config, json!({}));
    assert_eq!(project.usage(UsageCounter::Nodes), 0);
  }

  #[test]
  fn usage_reads_stats_by_counter_name() {
    let mut project = NewProject::named("papers").into_project();
    project.stats = json!({ "nodes": 12, "syncs": 2 });
    assert_eq!(project.usage(UsageCounter::Nodes), 12);
    assert_eq!(project.usage(UsageCounter::Syncs), 2);
    assert_eq!(UsageCounter::Documents.to_string(), "documents");
  }
}
