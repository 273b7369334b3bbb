//! Execution sandbox: runs one piece of student code with fresh capture buffers.
//!
//! [`Sandbox::run`] is the async entry point used by the engine; it never loads
//! the runtime itself. [`execute_job`] is what the worker thread does per job.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, instrument, warn};

use crate::config::SandboxConfig;
use crate::domain::ExecutionOutcome;
use crate::error::RuntimeError;
use crate::interp::{ExcType, Exception, Interpreter};
use crate::runtime::RuntimeHandle;

#[derive(Debug, Clone)]
pub struct Sandbox {
  runtime: Arc<RuntimeHandle>,
}

impl Sandbox {
  pub fn new(runtime: Arc<RuntimeHandle>) -> Self {
    Self { runtime }
  }

  /// Runs `code` on the sandbox worker. Only fails when the runtime is not ready
  /// or its worker died; faults in the code itself land in the outcome.
  #[instrument(level = "debug", skip(self, code), fields(code_len = code.len()))]
  pub async fn run(&self, code: &str) -> Result<ExecutionOutcome, RuntimeError> {
    let worker = self.runtime.worker()?;
    let outcome = worker.execute(code.to_string()).await?;
    debug!(
      target: "sandbox",
      wall_time_ms = outcome.wall_time_ms,
      stdout_len = outcome.stdout.len(),
      fault = outcome.fault.as_deref().unwrap_or("-"),
      "Run finished"
    );
    Ok(outcome)
  }
}

/// Runs one job on the worker thread. Never panics: a panic in the interpreter is
/// reported as an `InternalError` and the namespace is reset.
pub(crate) fn execute_job(interp: &mut Interpreter, config: &SandboxConfig, code: &str) -> ExecutionOutcome {
  if config.fresh_namespace_per_run {
    reset_namespace(interp, config);
  }

  let started = Instant::now();
  let result = panic::catch_unwind(AssertUnwindSafe(|| interp.execute(code)));
  let wall_time_ms = started.elapsed().as_millis() as u64;

  match result {
    Ok(out) => {
      let fault = out.fault.map(|f| {
        if f.is_resource_limit() {
          warn!(target: "sandbox", fault = %f, "Run stopped by a resource limit");
        }
        f.type_name().to_string()
      });
      ExecutionOutcome { stdout: out.stdout, stderr: out.stderr, wall_time_ms, fault }
    }
    Err(payload) => {
      let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
      error!(target: "sandbox", %detail, "Interpreter panicked; namespace reset");
      reset_namespace(interp, config);
      let exc = Exception::new(ExcType::InternalError, "the sandbox failed while running this code");
      ExecutionOutcome {
        stdout: String::new(),
        stderr: exc.traceback(),
        wall_time_ms,
        fault: Some(ExcType::InternalError.to_string()),
      }
    }
  }
}

fn reset_namespace(interp: &mut Interpreter, config: &SandboxConfig) {
  interp.reset();
  if let Some(prelude) = config.prelude.as_deref() {
    // Already checked when the worker started.
    let _ = interp.execute(prelude);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn interp(config: &SandboxConfig) -> Interpreter {
    Interpreter::new(config.limits())
  }

  #[test]
  fn fresh_namespace_hides_previous_globals() {
    let config = SandboxConfig::default();
    let mut i = interp(&config);
    let first = execute_job(&mut i, &config, "x = 41");
    assert!(first.fault.is_none());
    let second = execute_job(&mut i, &config, "print(x + 1)");
    assert_eq!(second.fault.as_deref(), Some("NameError"));
    assert!(second.stderr.contains("NameError"));
  }

  #[test]
  fn shared_namespace_keeps_globals() {
    let config = SandboxConfig { fresh_namespace_per_run: false, ..SandboxConfig::default() };
    let mut i = interp(&config);
    execute_job(&mut i, &config, "x = 41");
    let out = execute_job(&mut i, &config, "print(x + 1)");
    assert_eq!(out.stdout, "42\n");
  }

  #[test]
  fn prelude_survives_reset() {
    let config = SandboxConfig {
      prelude: Some("def double(n):\n    return n * 2\n".into()),
      ..SandboxConfig::default()
    };
    let mut i = interp(&config);
    i.execute(config.prelude.as_deref().unwrap());
    let out = execute_job(&mut i, &config, "print(double(21))");
    assert_eq!(out.stdout, "42\n");
  }

  #[test]
  fn capture_buffers_start_empty() {
    let config = SandboxConfig { fresh_namespace_per_run: false, ..SandboxConfig::default() };
    let mut i = interp(&config);
    execute_job(&mut i, &config, "print('first')");
    let out = execute_job(&mut i, &config, "print('second')");
    assert_eq!(out.stdout, "second\n");
    assert!(out.stderr.is_empty());
  }

  #[test]
  fn runaway_loop_is_stopped() {
    let config = SandboxConfig { max_operations: 10_000, ..SandboxConfig::default() };
    let mut i = interp(&config);
    let out = execute_job(&mut i, &config, "while True:\n    pass\n");
    assert_eq!(out.fault.as_deref(), Some("TimeoutError"));
  }
}
