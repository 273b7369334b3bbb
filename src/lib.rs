//! Caatuu challenge engine.
//!
//! Runs student code for programming micro-challenges in a sandboxed Python-subset
//! interpreter, grades it (syntax, required concepts, reference similarity,
//! output), tracks per-user attempt sessions and awards XP.
//!
//! [`engine::ChallengeEngine`] is the entry point for in-process callers; the
//! `routes` module exposes the same operations over HTTP and WebSocket.

pub mod concepts;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod interp;
pub mod logic;
pub mod protocol;
pub mod routes;
pub mod runtime;
pub mod sandbox;
pub mod scoring;
pub mod seeds;
pub mod session;
pub mod similarity;
pub mod state;
pub mod telemetry;
pub mod validator;

pub use domain::{
  Challenge, ChallengeSession, CodeSubmission, CustomValidator, EngineStatus, ExecutionOutcome, ExecutionReport, Hint,
  ValidationError, ValidationResult,
};
pub use engine::ChallengeEngine;
pub use error::{EngineError, RuntimeError};
