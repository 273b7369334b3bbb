//! Error types returned by the runtime and the engine facade.
//!
//! Execution faults and validation failures are never errors here: they are
//! folded into `ValidationResult`/`ExecutionOutcome`. Only readiness and
//! bookkeeping problems surface as `Err`.

use thiserror::Error;

/// Failures of the sandbox runtime. All of them are retryable via `ensure_ready`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
  #[error("runtime is not ready")]
  NotReady,
  #[error("runtime initialization failed: {0}")]
  InitFailed(String),
  #[error("sandbox worker is gone")]
  WorkerGone,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
  #[error("runtime is not ready; call ensure_ready first")]
  RuntimeNotReady,
  #[error("no active session for this challenge")]
  NoActiveSession,
  #[error("unknown challenge: {0}")]
  UnknownChallenge(String),
  #[error(transparent)]
  Runtime(#[from] RuntimeError),
}

impl EngineError {
  /// Short machine-readable code used by the service layer.
  pub fn code(&self) -> &'static str {
    match self {
      EngineError::RuntimeNotReady | EngineError::Runtime(RuntimeError::NotReady) => "runtime_not_ready",
      EngineError::NoActiveSession => "no_active_session",
      EngineError::UnknownChallenge(_) => "unknown_challenge",
      EngineError::Runtime(_) => "runtime_error",
    }
  }
}
