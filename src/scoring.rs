//! XP award: a base proportional to the score plus three bonuses for valid solves.

use serde::Serialize;

use crate::domain::{Challenge, ChallengeSession, CodeSubmission};

/// Each XP component, for display next to the total.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct XpBreakdown {
  pub base: u32,
  pub first_attempt_bonus: u32,
  pub no_hints_bonus: u32,
  pub speed_bonus: u32,
  pub total: u32,
}

fn share(xp: u32, percent: u64) -> u32 {
  (u64::from(xp) * percent / 100) as u32
}

pub fn xp_breakdown(challenge: &Challenge, submission: &CodeSubmission, session: &ChallengeSession) -> XpBreakdown {
  let result = &submission.validation_result;
  let xp = challenge.xp_reward;
  let valid = result.is_valid;

  let base = share(xp, result.score.clamp(0, 100) as u64);
  let first_attempt_bonus = if valid && session.attempts == 1 { share(xp, 50) } else { 0 };
  let no_hints_bonus = if valid && session.hints_unlocked.is_empty() { share(xp, 30) } else { 0 };

  // Half the estimate, in milliseconds: estimated_time * 60_000 / 2.
  let elapsed_ms = submission
    .submitted_at
    .signed_duration_since(session.started_at)
    .num_milliseconds();
  let speed_limit_ms = i64::from(challenge.estimated_time) * 30_000;
  let speed_bonus = if valid && elapsed_ms < speed_limit_ms { share(xp, 20) } else { 0 };

  let total = base
    .saturating_add(first_attempt_bonus)
    .saturating_add(no_hints_bonus)
    .saturating_add(speed_bonus);
  XpBreakdown { base, first_attempt_bonus, no_hints_bonus, speed_bonus, total }
}

pub fn calculate_xp(challenge: &Challenge, submission: &CodeSubmission, session: &ChallengeSession) -> u32 {
  xp_breakdown(challenge, submission, session).total
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::ValidationResult;
  use chrono::{Duration, Utc};

  fn submission(score: i64, after: Duration, session: &ChallengeSession) -> CodeSubmission {
    CodeSubmission {
      id: "s".into(),
      code: String::new(),
      submitted_at: session.started_at + after,
      validation_result: ValidationResult::new(score, "", vec![]),
      output: String::new(),
    }
  }

  fn session(attempts: u32) -> ChallengeSession {
    let mut s = ChallengeSession::new("c", "u");
    s.attempts = attempts;
    s
  }

  #[test]
  fn perfect_fast_first_try_earns_all_bonuses() {
    let ch = Challenge::new("c", "t", 10, 100);
    let s = session(1);
    let b = xp_breakdown(&ch, &submission(100, Duration::minutes(2), &s), &s);
    assert_eq!(b, XpBreakdown { base: 100, first_attempt_bonus: 50, no_hints_bonus: 30, speed_bonus: 20, total: 200 });
  }

  #[test]
  fn invalid_submission_only_gets_base() {
    let ch = Challenge::new("c", "t", 10, 100);
    let s = session(1);
    assert_eq!(calculate_xp(&ch, &submission(50, Duration::minutes(1), &s), &s), 50);
    assert_eq!(calculate_xp(&ch, &submission(0, Duration::minutes(1), &s), &s), 0);
  }

  #[test]
  fn first_attempt_earns_strictly_more() {
    let ch = Challenge::new("c", "t", 10, 100);
    let first = session(1);
    let third = session(3);
    let a = calculate_xp(&ch, &submission(90, Duration::minutes(1), &first), &first);
    let b = calculate_xp(&ch, &submission(90, Duration::minutes(1), &third), &third);
    assert!(a > b);
  }

  #[test]
  fn hints_and_slowness_drop_bonuses() {
    let ch = Challenge::new("c", "t", 10, 75);
    let mut s = session(2);
    s.hints_unlocked.push("h1".into());
    let b = xp_breakdown(&ch, &submission(80, Duration::minutes(5), &s), &s);
    assert_eq!(b.base, 60);
    assert_eq!(b.no_hints_bonus, 0);
    assert_eq!(b.speed_bonus, 0);
    assert_eq!(b.total, 60);
  }

  #[test]
  fn bonuses_round_down() {
    let ch = Challenge::new("c", "t", 10, 15);
    let s = session(1);
    let b = xp_breakdown(&ch, &submission(100, Duration::seconds(10), &s), &s);
    assert_eq!((b.base, b.first_attempt_bonus, b.no_hints_bonus, b.speed_bonus), (15, 7, 4, 3));
  }
}
