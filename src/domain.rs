//! Domain models shared by the engine and the service: challenges, validation
//! results, sessions and submissions.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score at or above which a submission counts as valid.
pub const PASS_SCORE: u8 = 70;

/// One hint attached to a challenge, unlocked in order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hint {
  pub id: String,
  pub text: String,
}

/// Caller-supplied validator that replaces the built-in pipeline.
///
/// Receives the submitted code and what running it produced.
#[derive(Clone)]
pub struct CustomValidator(Arc<dyn Fn(&str, &ExecutionOutcome) -> ValidationResult + Send + Sync>);

impl CustomValidator {
  pub fn new(f: impl Fn(&str, &ExecutionOutcome) -> ValidationResult + Send + Sync + 'static) -> Self {
    Self(Arc::new(f))
  }

  pub fn validate(&self, code: &str, outcome: &ExecutionOutcome) -> ValidationResult {
    (self.0)(code, outcome)
  }
}

impl fmt::Debug for CustomValidator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("CustomValidator(..)")
  }
}

/// A gradeable micro-challenge. Read-only to the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
  pub id: String,
  pub title: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub difficulty: String, // free-form ("beginner", "intermediate", ...)
  #[serde(default)] pub concepts: Vec<String>,
  /// Minutes.
  pub estimated_time: u32,
  pub xp_reward: u32,
  #[serde(default)] pub solution: Option<String>,
  #[serde(default)] pub hints: Vec<Hint>,
  /// Exact stdout expected from a correct program.
  #[serde(default)] pub expected_output: Option<String>,
  /// `Some(false)` opts the challenge out of the output check.
  #[serde(default)] pub expects_output: Option<bool>,
  #[serde(skip)] pub validator: Option<CustomValidator>,
}

impl Challenge {
  /// Minimal challenge, mostly for tests and ad hoc callers.
  pub fn new(id: impl Into<String>, title: impl Into<String>, estimated_time: u32, xp_reward: u32) -> Self {
    Self {
      id: id.into(),
      title: title.into(),
      description: String::new(),
      difficulty: String::new(),
      concepts: Vec::new(),
      estimated_time,
      xp_reward,
      solution: None,
      hints: Vec::new(),
      expected_output: None,
      expects_output: None,
      validator: None,
    }
  }

  pub fn with_concepts<I, S>(mut self, concepts: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.concepts = concepts.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_solution(mut self, solution: impl Into<String>) -> Self {
    self.solution = Some(solution.into());
    self
  }

  pub fn with_hint(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
    self.hints.push(Hint { id: id.into(), text: text.into() });
    self
  }

  pub fn with_expected_output(mut self, expected: impl Into<String>) -> Self {
    self.expected_output = Some(expected.into());
    self
  }

  pub fn with_validator(mut self, validator: CustomValidator) -> Self {
    self.validator = Some(validator);
    self
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  Syntax,
  Logic,
  Runtime,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Error,
  Warning,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
  pub message: String,
  #[serde(rename = "type")]
  pub kind: ErrorKind,
  pub severity: Severity,
}

impl ValidationError {
  pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self { message: message.into(), kind, severity: Severity::Error }
  }

  pub fn warning(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self { message: message.into(), kind, severity: Severity::Warning }
  }
}

/// Aggregate verdict for one piece of code.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
  pub is_valid: bool,
  pub score: u8,
  pub feedback: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub errors: Option<Vec<ValidationError>>,
}

impl ValidationResult {
  /// Builds a result, clamping the score and deriving `is_valid`.
  pub fn new(score: i64, feedback: impl Into<String>, errors: Vec<ValidationError>) -> Self {
    let score = score.clamp(0, 100) as u8;
    let errors = if errors.is_empty() { None } else { Some(errors) };
    let mut out = Self { is_valid: false, score, feedback: feedback.into(), errors };
    out.is_valid = out.derive_valid();
    out
  }

  /// A failed result with a single error entry.
  pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
    let message = message.into();
    Self::new(0, message.clone(), vec![ValidationError::error(kind, message)])
  }

  pub fn has_blocking_errors(&self) -> bool {
    self
      .errors
      .as_deref()
      .is_some_and(|errs| errs.iter().any(|e| e.severity == Severity::Error))
  }

  /// Re-applies the clamp and validity rule, for results built elsewhere.
  pub fn normalized(mut self) -> Self {
    self.score = self.score.min(100);
    if self.errors.as_ref().is_some_and(Vec::is_empty) {
      self.errors = None;
    }
    self.is_valid = self.derive_valid();
    self
  }

  fn derive_valid(&self) -> bool {
    self.score >= PASS_SCORE && !self.has_blocking_errors()
  }
}

/// Raw result of running code in the sandbox.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
  pub stdout: String,
  pub stderr: String,
  pub wall_time_ms: u64,
  /// Exception type name when the run did not finish normally.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fault: Option<String>,
}

impl ExecutionOutcome {
  /// Output lines as shown to the student: stdout first, then the error line.
  pub fn output_lines(&self) -> Vec<String> {
    let mut lines: Vec<String> = self.stdout.lines().map(str::to_string).collect();
    if self.fault.is_some() {
      if let Some(last) = self.stderr.lines().rev().find(|l| !l.trim().is_empty()) {
        let line_no = self
          .stderr
          .lines()
          .filter_map(|l| l.trim().strip_prefix("line "))
          .last();
        match line_no {
          Some(n) => lines.push(format!("Error: {} (line {})", last.trim(), n.trim())),
          None => lines.push(format!("Error: {}", last.trim())),
        }
      }
    }
    lines
  }
}

/// Result of `execute_code`: run and validate without touching any session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
  pub output: Vec<String>,
  pub validation_result: ValidationResult,
  pub execution_time_ms: u64,
}

/// Immutable record of one evaluated attempt.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CodeSubmission {
  pub id: String,
  pub code: String,
  pub submitted_at: DateTime<Utc>,
  pub validation_result: ValidationResult,
  pub output: String,
}

/// One user's ongoing attempts at one challenge.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSession {
  pub id: String,
  pub challenge_id: String,
  pub user_id: String,
  pub started_at: DateTime<Utc>,
  pub last_activity_at: DateTime<Utc>,
  pub current_code: String,
  pub attempts: u32,
  pub hints_unlocked: Vec<String>,
  pub output: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_validation: Option<ValidationResult>,
}

impl ChallengeSession {
  pub fn new(challenge_id: impl Into<String>, user_id: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      challenge_id: challenge_id.into(),
      user_id: user_id.into(),
      started_at: now,
      last_activity_at: now,
      current_code: String::new(),
      attempts: 0,
      hints_unlocked: Vec::new(),
      output: Vec::new(),
      last_validation: None,
    }
  }

  /// Records a hint id; returns false when it was already unlocked.
  pub fn unlock_hint(&mut self, hint_id: &str) -> bool {
    if self.hints_unlocked.iter().any(|h| h == hint_id) {
      return false;
    }
    self.hints_unlocked.push(hint_id.to_string());
    self.last_activity_at = Utc::now();
    true
  }

  /// Folds a finished submission into the session.
  pub fn record(&mut self, submission: &CodeSubmission, output: Vec<String>) {
    self.attempts += 1;
    self.current_code = submission.code.clone();
    self.output = output;
    self.last_validation = Some(submission.validation_result.clone());
    self.last_activity_at = submission.submitted_at;
  }
}

/// Snapshot of the runtime lifecycle.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineStatus {
  pub ready: bool,
  pub initializing: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}
