//! Runtime configuration, deserialised from `roster.toml` and `ROSTER_*`
//! environment variables.
//!
//! Every field has a default, so an absent file yields a working in-process
//! server on `127.0.0.1:5080`.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use roster_core::{
  query::DEFAULT_MAX_PAGE_SIZE,
  retry::{FaultInjector, NeverFail, RandomFaults, RetryPolicy},
};
use serde::Deserialize;

// ─── Sections ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:          String,
  pub port:          u16,
  /// SQLite file, or `:memory:` for a throwaway store.
  pub store_path:    PathBuf,
  pub max_page_size: u32,
  pub retry:         RetryConfig,
  pub faults:        FaultConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:          "127.0.0.1".to_owned(),
      port:          5080,
      store_path:    PathBuf::from("roster.db"),
      max_page_size: DEFAULT_MAX_PAGE_SIZE,
      retry:         RetryConfig::default(),
      faults:        FaultConfig::default(),
    }
  }
}

/// Backoff for record creation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub max_retries:        u32,
  pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    let policy = RetryPolicy::default();
    Self {
      max_retries:        policy.max_retries,
      initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
    }
  }
}

impl RetryConfig {
  pub fn policy(&self) -> RetryPolicy {
    RetryPolicy::new(self.max_retries, Duration::from_millis(self.initial_backoff_ms))
  }
}

/// Synthetic failures injected into record creation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
  pub enabled: bool,
  pub one_in:  u32,
  pub seed:    Option<u64>,
}

impl Default for FaultConfig {
  fn default() -> Self {
    Self { enabled: false, one_in: 3, seed: None }
  }
}

impl FaultConfig {
  pub fn injector(&self) -> Arc<dyn FaultInjector> {
    match (self.enabled, self.seed) {
      (false, _) => Arc::new(NeverFail),
      (true, Some(seed)) => Arc::new(RandomFaults::seeded(seed, self.one_in)),
      (true, None) => Arc::new(RandomFaults::from_entropy(self.one_in)),
    }
  }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl ServerConfig {
  /// Layer the optional file at `path` under `ROSTER_*` variables. Nested
  /// keys use `__`, e.g. `ROSTER_RETRY__MAX_RETRIES=5`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let builder = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("ROSTER")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      );
    Self::from_builder(builder)
  }

  fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> anyhow::Result<Self> {
    builder
      .build()
      .context("failed to read config")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  /// `None` when the store should live in memory.
  pub fn store_file(&self) -> Option<PathBuf> {
    if self.store_path.as_os_str() == ":memory:" {
      None
    } else {
      Some(expand_tilde(&self.store_path))
    }
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
