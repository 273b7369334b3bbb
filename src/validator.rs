//! Validation pipeline: syntax, concept coverage, reference similarity, output.
//!
//! Points: concepts share 60, the output check is worth 40. A normalized exact
//! match with the reference solution scores 100 outright; a close match (> 0.8
//! similarity) lifts the score to at least 85. Challenges with neither concepts
//! nor a reference solution are graded on output alone.
//!
//! Like the concept table, this is a scoring heuristic. It does not prove the
//! submitted program correct.

use tracing::{debug, instrument, warn};

use crate::concepts::missing_concepts;
use crate::domain::{Challenge, ErrorKind, ExecutionOutcome, ValidationError, ValidationResult};
use crate::interp::{check_syntax, SyntaxError};
use crate::similarity::{normalize, similarity};

pub const CONCEPT_POINTS: f64 = 60.0;
pub const OUTPUT_POINTS: f64 = 40.0;
/// Output points when stdout differs from `expected_output`.
pub const MISMATCH_OUTPUT_POINTS: f64 = 20.0;
pub const SIMILARITY_THRESHOLD: f64 = 0.8;
pub const SIMILARITY_FLOOR: f64 = 85.0;

const PERFECT_FEEDBACK: &str = "Perfect! Your solution matches the reference solution.";
const PASS_FEEDBACK: &str = "Great job! Your code meets all the requirements.";
const NO_OUTPUT_NOTE: &str = "Your code didn't produce any output. Try using print() to show your result.";

fn syntax_message(err: &SyntaxError) -> String {
  format!("Syntax error on line {}: {}", err.line, err.message)
}

/// Parses without executing. `Some` carries the final (failed) result.
pub fn validate_syntax(code: &str) -> Option<ValidationResult> {
  check_syntax(code)
    .err()
    .map(|err| ValidationResult::failure(ErrorKind::Syntax, syntax_message(&err)))
}

/// Scores `code` given what running it produced.
#[instrument(level = "debug", skip(code, challenge, outcome), fields(id = %challenge.id, code_len = code.len()))]
pub fn validate(code: &str, challenge: &Challenge, outcome: &ExecutionOutcome) -> ValidationResult {
  if let Some(custom) = &challenge.validator {
    let result = custom.validate(code, outcome).normalized();
    debug!(target: "challenge", id = %challenge.id, score = result.score, "Custom validator applied");
    return result;
  }

  if let Some(failed) = validate_syntax(code) {
    return failed;
  }

  if outcome.fault.is_some() {
    let detail = outcome
      .stderr
      .lines()
      .rev()
      .find(|l| !l.trim().is_empty())
      .unwrap_or("the program stopped with an error")
      .trim();
    return ValidationResult::failure(ErrorKind::Runtime, format!("Your code raised an error: {detail}"));
  }

  let mut score = 0.0_f64;
  let mut notes: Vec<String> = Vec::new();
  let mut errors: Vec<ValidationError> = Vec::new();

  let output_only = challenge.concepts.is_empty() && challenge.solution.is_none();
  if output_only {
    warn!(target: "challenge", id = %challenge.id, "Challenge has no concepts and no reference solution; grading output only");
  }

  // Concepts.
  if !output_only {
    if challenge.concepts.is_empty() {
      score += CONCEPT_POINTS;
    } else {
      let missing = missing_concepts(&challenge.concepts, code);
      let per_concept = CONCEPT_POINTS / challenge.concepts.len() as f64;
      score += per_concept * (challenge.concepts.len() - missing.len()) as f64;
      for tag in missing {
        notes.push(format!("Try using {tag} in your solution."));
      }
    }
  }

  // Reference solution.
  if let Some(solution) = &challenge.solution {
    let submitted = normalize(code);
    let reference = normalize(solution);
    if submitted == reference {
      debug!(target: "challenge", id = %challenge.id, "Exact match with reference solution");
      return ValidationResult::new(100, PERFECT_FEEDBACK, Vec::new());
    }
    let sim = similarity(&submitted, &reference);
    debug!(target: "challenge", id = %challenge.id, similarity = sim, "Compared with reference solution");
    if sim > SIMILARITY_THRESHOLD {
      score = score.max(SIMILARITY_FLOOR);
    }
  }

  // Output.
  let scale = if output_only { 100.0 / OUTPUT_POINTS } else { 1.0 };
  if challenge.expects_output == Some(false) {
    score += OUTPUT_POINTS * scale;
  } else if outcome.stdout.trim().is_empty() {
    notes.push(NO_OUTPUT_NOTE.to_string());
  } else if let Some(expected) = &challenge.expected_output {
    if normalize_output(&outcome.stdout) == normalize_output(expected) {
      score += OUTPUT_POINTS * scale;
    } else {
      score += MISMATCH_OUTPUT_POINTS * scale;
      let msg = "Your output doesn't match the expected output.";
      notes.push(msg.to_string());
      errors.push(ValidationError::warning(ErrorKind::Logic, msg));
    }
  } else {
    score += OUTPUT_POINTS * scale;
  }

  let feedback = if notes.is_empty() { PASS_FEEDBACK.to_string() } else { notes.join(" ") };
  let result = ValidationResult::new(score.round() as i64, feedback, errors);
  debug!(target: "challenge", id = %challenge.id, score = result.score, valid = result.is_valid, "Validation finished");
  result
}

/// Trims trailing whitespace per line and surrounding blank lines.
fn normalize_output(text: &str) -> String {
  text
    .replace("\r\n", "\n")
    .lines()
    .map(str::trim_end)
    .collect::<Vec<_>>()
    .join("\n")
    .trim()
    .to_string()
}

/// As-you-type feedback: syntax error plus missing-concept warnings. Never runs code.
#[instrument(level = "debug", skip(code, challenge), fields(id = %challenge.id, code_len = code.len()))]
pub fn validate_realtime(code: &str, challenge: &Challenge) -> Vec<ValidationError> {
  let mut out = Vec::new();
  if let Err(err) = check_syntax(code) {
    out.push(ValidationError::error(ErrorKind::Syntax, syntax_message(&err)));
  }
  for tag in missing_concepts(&challenge.concepts, code) {
    out.push(ValidationError::warning(ErrorKind::Logic, format!("Missing concept: {tag}")));
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{CustomValidator, Severity};

  fn ran(stdout: &str) -> ExecutionOutcome {
    ExecutionOutcome { stdout: stdout.into(), ..ExecutionOutcome::default() }
  }

  #[test]
  fn syntax_failure_short_circuits() {
    let ch = Challenge::new("c", "t", 10, 100).with_concepts(["Variables"]);
    let r = validate("if x print(x)", &ch, &ran(""));
    assert_eq!(r.score, 0);
    assert!(!r.is_valid);
    let errors = r.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::Syntax);
  }

  #[test]
  fn full_marks_for_concepts_and_output() {
    let ch = Challenge::new("c", "t", 10, 100).with_concepts(["Variables"]);
    let r = validate("x = 5\nprint(x)", &ch, &ran("5\n"));
    assert_eq!(r.score, 100);
    assert!(r.is_valid);
    assert_eq!(r.feedback, PASS_FEEDBACK);
  }

  #[test]
  fn missing_concept_is_named_in_feedback() {
    let ch = Challenge::new("c", "t", 10, 100).with_concepts(["Variables", "Loops"]);
    let r = validate("x = 5\nprint(x)", &ch, &ran("5\n"));
    assert!(r.score <= 30 + 40);
    assert!(r.feedback.contains("Loops"));
  }

  #[test]
  fn exact_reference_match_scores_100() {
    let ch = Challenge::new("c", "t", 10, 100)
      .with_concepts(["Loops"])
      .with_solution("for i in range(3):\n    print(i)");
    let r = validate("FOR i in range(3):   print(i)\n", &ch, &ran(""));
    assert_eq!(r.score, 100);
    assert!(r.is_valid);
    assert_eq!(r.feedback, PERFECT_FEEDBACK);
  }

  #[test]
  fn close_match_lifts_floor() {
    let ch = Challenge::new("c", "t", 10, 100)
      .with_concepts(["Functions", "Recursion"])
      .with_solution("total = 0\nfor n in range(10):\n    total = total + n\nprint(total)");
    let r = validate("total = 0\nfor n in range(10):\n    total = total + n\nprint(total + 0)", &ch, &ran(""));
    assert!(r.score >= 85, "score {}", r.score);
  }

  #[test]
  fn empty_output_gets_a_note() {
    let ch = Challenge::new("c", "t", 10, 100).with_concepts(["Variables"]);
    let r = validate("x = 5", &ch, &ran(""));
    assert_eq!(r.score, 60);
    assert!(!r.is_valid);
    assert!(r.feedback.contains("print()"));
  }

  #[test]
  fn opting_out_of_output_awards_its_points() {
    let mut ch = Challenge::new("c", "t", 10, 100).with_concepts(["Variables"]);
    ch.expects_output = Some(false);
    let r = validate("x = 5", &ch, &ran(""));
    assert_eq!(r.score, 100);
  }

  #[test]
  fn mismatched_expected_output_gets_partial_credit() {
    let ch = Challenge::new("c", "t", 10, 100)
      .with_concepts(["Output"])
      .with_expected_output("Hello, World!");
    let wrong = validate("print('hello')", &ch, &ran("hello\n"));
    assert_eq!(wrong.score, 80);
    assert!(wrong.is_valid);
    assert_eq!(wrong.errors.as_ref().map(|e| e[0].severity), Some(Severity::Warning));
    let right = validate("print('Hello, World!')", &ch, &ran("Hello, World!  \r\n"));
    assert_eq!(right.score, 100);
  }

  #[test]
  fn runtime_fault_scores_zero() {
    let ch = Challenge::new("c", "t", 10, 100).with_concepts(["Output"]);
    let outcome = ExecutionOutcome {
      stdout: "partial\n".into(),
      stderr: "Traceback (most recent call last):\n  line 2\nNameError: name 'y' is not defined\n".into(),
      wall_time_ms: 0,
      fault: Some("NameError".into()),
    };
    let r = validate("print('partial')\nprint(y)", &ch, &outcome);
    assert_eq!(r.score, 0);
    assert!(!r.is_valid);
    let errors = r.errors.unwrap();
    assert_eq!(errors[0].kind, ErrorKind::Runtime);
    assert!(errors[0].message.contains("NameError"));
  }

  #[test]
  fn no_concepts_no_solution_grades_output_only() {
    let ch = Challenge::new("c", "t", 10, 100);
    assert_eq!(validate("print(1)", &ch, &ran("1\n")).score, 100);
    assert_eq!(validate("x = 1", &ch, &ran("")).score, 0);
  }

  #[test]
  fn custom_validator_replaces_pipeline() {
    let ch = Challenge::new("c", "t", 10, 100)
      .with_concepts(["Loops"])
      .with_validator(CustomValidator::new(|code, _| ValidationResult {
        is_valid: true,
        score: 250,
        feedback: format!("custom saw {} bytes", code.len()),
        errors: Some(vec![]),
      }));
    let r = validate("x = 1", &ch, &ran(""));
    assert_eq!(r.score, 100);
    assert!(r.is_valid);
    assert_eq!(r.errors, None);
    assert_eq!(r.feedback, "custom saw 5 bytes");
  }

  #[test]
  fn realtime_reports_syntax_and_missing_concepts() {
    let ch = Challenge::new("c", "t", 10, 100).with_concepts(["Variables", "Functions"]);
    let errs = validate_realtime("x = (1,", &ch);
    assert_eq!(errs[0].kind, ErrorKind::Syntax);
    assert_eq!(errs[0].severity, Severity::Error);
    assert!(errs.iter().any(|e| e.severity == Severity::Warning && e.message.contains("Functions")));
    assert!(validate_realtime("def f():\n    x = 1\n", &ch).is_empty());
  }
}
