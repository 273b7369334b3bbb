//! Loading engine configuration (sandbox limits, session TTL, optional challenge bank) from TOML.
//!
//! Example:
//!
//! ```toml
//! [sandbox]
//! fresh_namespace_per_run = true
//! max_operations = 2000000
//! max_duration_ms = 2000
//! prelude = "def greet(name):\n    return 'Hello, ' + name\n"
//!
//! [sessions]
//! ttl_secs = 3600
//!
//! [[challenges]]
//! id = "hello"
//! title = "Say hello"
//! concepts = ["Output"]
//! estimated_time = 2
//! xp_reward = 20
//! ```

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Challenge;
use crate::interp::ResourceLimits;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct EngineConfig {
  #[serde(default)]
  pub sandbox: SandboxConfig,
  #[serde(default)]
  pub sessions: SessionConfig,
  #[serde(default)]
  pub challenges: Vec<Challenge>,
}

/// Interpreter limits and namespace policy for the sandbox worker.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
  /// Drop globals left by the previous run before each new one.
  pub fresh_namespace_per_run: bool,
  pub max_operations: usize,
  pub max_duration_ms: u64,
  pub max_call_depth: usize,
  pub max_output_bytes: usize,
  /// Script executed once at load time; its definitions are visible to every run.
  pub prelude: Option<String>,
}

impl Default for SandboxConfig {
  fn default() -> Self {
    let limits = ResourceLimits::default();
    Self {
      fresh_namespace_per_run: true,
      max_operations: limits.max_operations,
      max_duration_ms: limits.max_duration.as_millis() as u64,
      max_call_depth: limits.max_call_depth,
      max_output_bytes: limits.max_output_bytes,
      prelude: None,
    }
  }
}

impl SandboxConfig {
  pub fn limits(&self) -> ResourceLimits {
    ResourceLimits::default()
      .max_operations(self.max_operations)
      .max_duration(Duration::from_millis(self.max_duration_ms))
      .max_call_depth(self.max_call_depth)
      .max_output_bytes(self.max_output_bytes)
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
  /// Sessions idle longer than this are evicted by the sweeper.
  pub ttl_secs: u64,
  pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self { ttl_secs: 60 * 60, sweep_interval_secs: 60 }
  }
}

impl SessionConfig {
  pub fn ttl(&self) -> Duration { Duration::from_secs(self.ttl_secs) }
  pub fn sweep_interval(&self) -> Duration { Duration::from_secs(self.sweep_interval_secs.max(1)) }
}

/// Attempt to load `EngineConfig` from ENGINE_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_engine_config_from_env() -> Option<EngineConfig> {
  let path = std::env::var("ENGINE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<EngineConfig>(&s) {
      Ok(cfg) => {
        info!(target: "caatuu_engine", %path, bank = cfg.challenges.len(), "Loaded engine config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "caatuu_engine", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "caatuu_engine", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_partial_toml_with_defaults() {
    let cfg: EngineConfig = toml::from_str(
      r#"
        [sandbox]
        fresh_namespace_per_run = false
        max_duration_ms = 500

        [[challenges]]
        id = "sum"
        title = "Sum a list"
        concepts = ["Lists", "Loops"]
        estimated_time = 5
        xp_reward = 40
        hints = [{ id = "h1", text = "Use a for loop" }]
      "#,
    )
    .unwrap();
    assert!(!cfg.sandbox.fresh_namespace_per_run);
    assert_eq!(cfg.sandbox.limits().max_duration, Duration::from_millis(500));
    assert_eq!(cfg.sandbox.max_call_depth, ResourceLimits::default().max_call_depth);
    assert_eq!(cfg.sessions.ttl_secs, 3600);
    assert_eq!(cfg.challenges[0].concepts, vec!["Lists", "Loops"]);
    assert_eq!(cfg.challenges[0].hints[0].id, "h1");
    assert!(cfg.challenges[0].validator.is_none());
  }

  #[test]
  fn empty_config_uses_defaults() {
    let cfg: EngineConfig = toml::from_str("").unwrap();
    assert!(cfg.sandbox.fresh_namespace_per_run);
    assert!(cfg.challenges.is_empty());
  }
}
