//! Server configuration: an optional TOML file under `ONTOGRAPH_`-prefixed
//! environment variables.
//!
//! Nested keys use `__` in the environment, e.g.
//! `ONTOGRAPH_RETRY__MAX_ATTEMPTS=6` or `ONTOGRAPH_SYNC__SAMPLE_SIZE=100`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use ontograph_engine::{EngineConfig, PipelineOptions, RetryPolicy, SyncConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  pub retry:      RetryPolicy,
  pub sync:       SyncConfig,
  pub pipeline:   PipelineOptions,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_owned(),
      port:       8080,
      store_path: PathBuf::from("ontograph.db"),
      retry:      RetryPolicy::default(),
      sync:       SyncConfig::default(),
      pipeline:   PipelineOptions::default(),
    }
  }
}

impl ServerConfig {
  /// Read `path` if it exists, then apply environment overrides.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    Self::from_builder(Config::builder().add_source(File::from(path).required(false)))
  }

  fn from_builder(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<Self> {
    builder
      .add_source(
        Environment::with_prefix("ONTOGRAPH")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read configuration")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      retry:    self.retry,
      sync:     self.sync,
      pipeline: self.pipeline.clone(),
    }
  }

  /// `store_path` with a leading `~` expanded to the home directory.
  pub fn resolved_store_path(&self) -> PathBuf {
    let s = self.store_path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/")
      && let Ok(home) = std::env::var("HOME")
    {
      return PathBuf::from(home).join(rest);
    }
    self.store_path.clone()
  }
}

#[cfg(test)]
mod tests {
  use config::FileFormat;
  use ontograph_core::graph::Direction;

  use super::*;

  fn parse(toml: &str) -> ServerConfig {
    ServerConfig::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
      .unwrap()
  }

  #[test]
  fn empty_file_gives_defaults() {
    let cfg = parse("");
    assert_eq!(cfg.address(), "127.0.0.1:8080");
    assert_eq!(cfg.engine_config(), EngineConfig::default());
  }

  #[test]
  fn nested_sections_override_defaults() {
    let cfg = parse(
      r#"
        port = 9000
        store_path = "/var/lib/ontograph/graph.db"

        [retry]
        max_attempts = 6

        [sync]
        sample_size = 100

        [pipeline]
        relationship_type = "MENTIONED_WITH"
        direction = "DIRECTED"
      "#,
    );
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.retry.max_attempts, 6);
    assert_eq!(cfg.retry.base_delay_ms, RetryPolicy::default().base_delay_ms);
    assert_eq!(cfg.sync.sample_size, 100);
    assert_eq!(cfg.pipeline.relationship_type, "MENTIONED_WITH");
    assert_eq!(cfg.pipeline.direction, Direction::Directed);
  }

  #[test]
  fn relative_store_path_is_kept() {
    let cfg = parse(r#"store_path = "data/graph.db""#);
    assert_eq!(cfg.resolved_store_path(), PathBuf::from("data/graph.db"));
  }
}
