//! Reference-solution comparison: normalization plus normalized edit distance.

/// Collapses whitespace runs to one space, trims, and lowercases.
pub fn normalize(code: &str) -> String {
  code
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

/// Levenshtein distance over chars, two-row dynamic programming.
pub fn levenshtein(a: &str, b: &str) -> usize {
  let a: Vec<char> = a.chars().collect();
  let b: Vec<char> = b.chars().collect();
  if a.is_empty() {
    return b.len();
  }
  if b.is_empty() {
    return a.len();
  }
  let mut prev: Vec<usize> = (0..=b.len()).collect();
  let mut cur = vec![0; b.len() + 1];
  for (i, ca) in a.iter().enumerate() {
    cur[0] = i + 1;
    for (j, cb) in b.iter().enumerate() {
      let cost = usize::from(ca != cb);
      cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
    }
    std::mem::swap(&mut prev, &mut cur);
  }
  prev[b.len()]
}

/// Similarity in `[0, 1]` of two already-normalized strings.
pub fn similarity(a: &str, b: &str) -> f64 {
  let longest = a.chars().count().max(b.chars().count());
  if longest == 0 {
    return 1.0;
  }
  1.0 - levenshtein(a, b) as f64 / longest as f64
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_collapses_and_lowercases() {
    assert_eq!(normalize("  X  =\t5\n\nPrint(x) "), "x = 5 print(x)");
  }

  #[test]
  fn distance_basics() {
    assert_eq!(levenshtein("kitten", "sitting"), 3);
    assert_eq!(levenshtein("", "abc"), 3);
    assert_eq!(levenshtein("same", "same"), 0);
  }

  #[test]
  fn similarity_bounds() {
    assert_eq!(similarity("", ""), 1.0);
    assert_eq!(similarity("abc", "abc"), 1.0);
    assert_eq!(similarity("abc", "xyz"), 0.0);
    let near = similarity("for i in range(10): print(i)", "for i in range(10): print(j)");
    assert!(near > 0.8 && near < 1.0);
  }
}
