//! Concept detection: a declarative table from concept tag to structural patterns.
//!
//! Detection is a scoring heuristic, not a proof that the student understood the
//! concept. Most rules look at the code with string literals and comments blanked
//! out, so `print("for x in y")` does not count as a loop.

use std::sync::LazyLock;

use regex::Regex;
use tracing::error;

/// Which rendition of the source a rule is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeView {
  /// Source as submitted.
  Raw,
  /// String literals emptied, comments kept.
  NoStrings,
  /// String literals emptied and comments removed.
  Code,
}

#[derive(Debug, Clone, Copy)]
pub enum Detector {
  /// Satisfied when any pattern matches.
  Patterns(&'static [&'static str]),
  /// Structural checks a regex cannot express.
  Custom(fn(&str) -> bool),
}

#[derive(Debug, Clone, Copy)]
pub struct ConceptRule {
  /// Lowercase tag and its aliases.
  pub names: &'static [&'static str],
  pub view: CodeView,
  pub detector: Detector,
}

const IDENT: &str = r"[A-Za-z_]\w*";

pub static CONCEPT_RULES: &[ConceptRule] = &[
  ConceptRule {
    names: &["variables", "variable", "assignment", "assignments"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[
      r"(?m)^\s*[A-Za-z_]\w*(?:\s*,\s*[A-Za-z_]\w*)*\s*(?:[-+*/%]|//|\*\*)?=\s*[^=\s]",
    ]),
  },
  ConceptRule {
    names: &["loops", "loop", "iteration"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[r"(?m)^\s*for\s+.+\s+in\s+.+:", r"(?m)^\s*while\s+.+:"]),
  },
  ConceptRule {
    names: &["for loops", "for loop"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[r"(?m)^\s*for\s+.+\s+in\s+.+:"]),
  },
  ConceptRule {
    names: &["while loops", "while loop"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[r"(?m)^\s*while\s+.+:"]),
  },
  ConceptRule {
    names: &["functions", "function"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[r"(?m)^\s*def\s+[A-Za-z_]\w*\s*\(", r"\blambda\b[^:]*:"]),
  },
  ConceptRule {
    names: &["conditionals", "conditional", "if statements", "if statement"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[r"(?m)^\s*(?:if|elif)\s+.+:", r"\bif\b.+\belse\b"]),
  },
  ConceptRule {
    names: &["lists", "list"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[
      r"=\s*\[",
      r"\[\s*\]",
      r"\blist\s*\(",
      r"\.(?:append|extend|insert|pop|remove|sort)\s*\(",
      r"\bin\s+\[",
      r"\(\s*\[",
    ]),
  },
  ConceptRule {
    names: &["dictionaries", "dictionary", "dicts", "dict"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[
      r"\{[^{}]*:[^{}]*\}",
      r"=\s*\{\s*\}",
      r"\bdict\s*\(",
      r"\.(?:items|keys|values|setdefault)\s*\(",
    ]),
  },
  ConceptRule {
    names: &["strings", "string"],
    view: CodeView::Raw,
    detector: Detector::Patterns(&[
      r#""[^"\n]*"|'[^'\n]*'"#,
      r"\bstr\s*\(",
      r"\.(?:upper|lower|strip|split|join|replace|startswith|endswith|title|capitalize)\s*\(",
    ]),
  },
  ConceptRule {
    names: &["output", "print", "printing"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[r"\bprint\s*\("]),
  },
  ConceptRule {
    names: &["input", "user input"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[r"\binput\s*\("]),
  },
  ConceptRule {
    names: &["return values", "return value", "return"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[r"(?m)^\s*return\s+\S"]),
  },
  ConceptRule {
    names: &["operators", "operator", "arithmetic", "math"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[r"[\w)\]]\s*(?:\*\*|//|[-+*/%])\s*[\w(\[]", r"(?:[-+*/%]|//|\*\*)="]),
  },
  ConceptRule {
    names: &["comparison", "comparisons", "comparison operators"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[r"==|!=|<=|>=", r"[\w)\]]\s*[<>]\s*[-\w(\[]"]),
  },
  ConceptRule {
    names: &["booleans", "boolean", "logic", "logical operators"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[r"\b(?:True|False)\b", r"\b(?:and|or|not)\b"]),
  },
  ConceptRule {
    names: &["comments", "comment"],
    view: CodeView::NoStrings,
    detector: Detector::Patterns(&[r"#"]),
  },
  ConceptRule {
    names: &["f-strings", "f-string", "fstrings", "string formatting"],
    view: CodeView::Raw,
    detector: Detector::Patterns(&[r#"\b[fF][rR]?["']"#, r"\.format\s*\(", r#"["']\s*%\s*[\w(]"#]),
  },
  ConceptRule {
    names: &["list comprehensions", "list comprehension", "comprehensions"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[r"\[[^\[\]]*\bfor\b[^\[\]]*\bin\b[^\[\]]*\]"]),
  },
  ConceptRule {
    names: &["recursion", "recursive functions"],
    view: CodeView::Code,
    detector: Detector::Custom(has_recursive_function),
  },
  ConceptRule {
    names: &["tuples", "tuple"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[
      r"=\s*\([^()]*,[^()]*\)",
      r"\btuple\s*\(",
      r"(?m)^\s*[A-Za-z_]\w*\s*,\s*[A-Za-z_]\w*\s*=[^=]",
      r"(?m)^\s*return\s+[^,\n]+,",
    ]),
  },
  ConceptRule {
    names: &["range", "ranges"],
    view: CodeView::Code,
    detector: Detector::Patterns(&[r"\brange\s*\("]),
  },
];

/// Compiled patterns, index-aligned with `CONCEPT_RULES`.
static COMPILED: LazyLock<Vec<Vec<Regex>>> = LazyLock::new(|| {
  CONCEPT_RULES
    .iter()
    .map(|rule| match rule.detector {
      Detector::Patterns(patterns) => patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
          Ok(re) => Some(re),
          Err(e) => {
            error!(target: "challenge", pattern = %p, error = %e, "Invalid concept pattern");
            None
          }
        })
        .collect(),
      Detector::Custom(_) => Vec::new(),
    })
    .collect()
});

static DEF_RE: LazyLock<Option<Regex>> =
  LazyLock::new(|| Regex::new(&format!(r"^(\s*)def\s+({IDENT})\s*\(")).ok());

fn normalize_tag(tag: &str) -> String {
  tag.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Index of the rule for `tag`, if the tag is known.
fn rule_index(tag: &str) -> Option<usize> {
  let tag = normalize_tag(tag);
  CONCEPT_RULES.iter().position(|r| r.names.contains(&tag.as_str()))
}

/// The three renditions of a piece of source the rules match against.
#[derive(Debug)]
pub struct CodeViews<'a> {
  raw: &'a str,
  no_strings: String,
  code: String,
}

impl<'a> CodeViews<'a> {
  pub fn new(raw: &'a str) -> Self {
    let (no_strings, code) = blank_literals(raw);
    Self { raw, no_strings, code }
  }

  fn get(&self, view: CodeView) -> &str {
    match view {
      CodeView::Raw => self.raw,
      CodeView::NoStrings => &self.no_strings,
      CodeView::Code => &self.code,
    }
  }

  /// True when the code demonstrates `tag`. Unknown tags fall back to a
  /// case-insensitive search for the tag text itself.
  pub fn demonstrates(&self, tag: &str) -> bool {
    match rule_index(tag) {
      Some(i) => {
        let rule = &CONCEPT_RULES[i];
        let text = self.get(rule.view);
        match rule.detector {
          Detector::Patterns(_) => COMPILED[i].iter().any(|re| re.is_match(text)),
          Detector::Custom(check) => check(text),
        }
      }
      None => {
        let needle = tag.trim().to_lowercase();
        !needle.is_empty() && self.raw.to_lowercase().contains(&needle)
      }
    }
  }
}

/// Required concepts the code does not demonstrate, in challenge order.
pub fn missing_concepts<'c>(concepts: &'c [String], code: &str) -> Vec<&'c str> {
  let views = CodeViews::new(code);
  concepts
    .iter()
    .map(String::as_str)
    .filter(|tag| !views.demonstrates(tag))
    .collect()
}

/// Returns `(no_strings, code)`: string literal bodies emptied in both, comments
/// also dropped from the second. Line structure is preserved.
fn blank_literals(src: &str) -> (String, String) {
  let mut no_strings = String::with_capacity(src.len());
  let mut code = String::with_capacity(src.len());
  let chars: Vec<char> = src.chars().collect();
  let mut i = 0;
  while i < chars.len() {
    let c = chars[i];
    match c {
      '#' => {
        while i < chars.len() && chars[i] != '\n' {
          no_strings.push(chars[i]);
          i += 1;
        }
      }
      '"' | '\'' => {
        let triple = i + 2 < chars.len() && chars[i + 1] == c && chars[i + 2] == c;
        let quote_len = if triple { 3 } else { 1 };
        for _ in 0..quote_len {
          no_strings.push(c);
          code.push(c);
        }
        i += quote_len;
        loop {
          if i >= chars.len() {
            break;
          }
          let ch = chars[i];
          if ch == '\\' {
            i += 2;
            continue;
          }
          if ch == '\n' {
            no_strings.push('\n');
            code.push('\n');
            if !triple {
              i += 1;
              break;
            }
          }
          let closes = if triple {
            i + 2 < chars.len() && ch == c && chars[i + 1] == c && chars[i + 2] == c
          } else {
            ch == c
          };
          if closes {
            for _ in 0..quote_len {
              no_strings.push(c);
              code.push(c);
            }
            i += quote_len;
            break;
          }
          i += 1;
        }
      }
      _ => {
        no_strings.push(c);
        code.push(c);
        i += 1;
      }
    }
  }
  (no_strings, code)
}

/// A function whose body calls the function itself.
fn has_recursive_function(code: &str) -> bool {
  let Some(def_re) = DEF_RE.as_ref() else {
    return false;
  };
  let lines: Vec<&str> = code.lines().collect();
  for (idx, line) in lines.iter().enumerate() {
    let Some(caps) = def_re.captures(line) else {
      continue;
    };
    let indent = caps[1].len();
    let name = &caps[2];
    // One-line bodies: `def f(n): return f(n - 1)`.
    if let Some(colon) = line.rfind(':') {
      if calls(&line[colon + 1..], name) {
        return true;
      }
    }
    for body in &lines[idx + 1..] {
      if body.trim().is_empty() {
        continue;
      }
      let body_indent = body.len() - body.trim_start().len();
      if body_indent <= indent {
        break;
      }
      if calls(body, name) {
        return true;
      }
    }
  }
  false
}

/// True when `text` contains `name(` as a whole word, spaces allowed before the paren.
fn calls(text: &str, name: &str) -> bool {
  let is_ident = |c: char| c.is_alphanumeric() || c == '_';
  text.match_indices(name).any(|(at, _)| {
    let before = text[..at].chars().next_back();
    let after = text[at + name.len()..].trim_start();
    !before.is_some_and(is_ident) && after.starts_with('(')
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn find_rule(tag: &str) -> Option<&'static ConceptRule> {
    rule_index(tag).map(|i| &CONCEPT_RULES[i])
  }

  fn detect(tag: &str, code: &str) -> bool {
    CodeViews::new(code).demonstrates(tag)
  }

  #[test]
  fn every_pattern_compiles() {
    for (rule, compiled) in CONCEPT_RULES.iter().zip(COMPILED.iter()) {
      if let Detector::Patterns(patterns) = rule.detector {
        assert_eq!(patterns.len(), compiled.len(), "bad pattern in {:?}", rule.names);
      }
    }
  }

  #[test]
  fn tags_are_case_insensitive_with_aliases() {
    assert!(detect("Variables", "x = 5\nprint(x)"));
    assert!(detect("ASSIGNMENT", "x = 5"));
    assert!(detect("If Statements", "if x > 1:\n    pass\n"));
    assert!(find_rule("  For   Loops ").is_some());
  }

  #[test]
  fn assignment_is_not_comparison() {
    assert!(!detect("variables", "print(1 == 2)"));
    assert!(detect("variables", "total += 3"));
    assert!(detect("variables", "a, b = 1, 2"));
  }

  #[test]
  fn string_contents_do_not_count() {
    assert!(!detect("loops", "print('for x in items:')"));
    assert!(!detect("functions", "s = \"\"\"\ndef f():\n\"\"\""));
    assert!(detect("strings", "print('for x in items:')"));
  }

  #[test]
  fn comments_are_found_outside_strings() {
    assert!(detect("comments", "x = 1  # one"));
    assert!(!detect("comments", "print('#hashtag')"));
  }

  #[test]
  fn loop_flavors() {
    let for_loop = "for i in range(3):\n    print(i)\n";
    let while_loop = "while n > 0:\n    n -= 1\n";
    assert!(detect("loops", for_loop) && detect("loops", while_loop));
    assert!(detect("for loops", for_loop) && !detect("for loops", while_loop));
    assert!(detect("while loops", while_loop) && !detect("while loops", for_loop));
    assert!(detect("range", for_loop));
  }

  #[test]
  fn collections() {
    assert!(detect("lists", "xs = [1, 2, 3]"));
    assert!(detect("dictionaries", "ages = {'ann': 3}"));
    assert!(!detect("dictionaries", "s = {1, 2}"));
    assert!(detect("tuples", "point = (1, 2)"));
    assert!(!detect("tuples", "print(1, 2)"));
    assert!(detect("list comprehensions", "sq = [n * n for n in range(5)]"));
  }

  #[test]
  fn recursion_needs_self_call() {
    let rec = "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\n";
    let plain = "def fact(n):\n    return 1\n\nprint(fact(3))\n";
    assert!(detect("recursion", rec));
    assert!(!detect("recursion", plain));
    assert!(detect("recursion", "def f(n): return f (n - 1)\n"));
  }

  #[test]
  fn self_call_must_be_a_whole_word() {
    assert!(calls("return n * fact(n - 1)", "fact"));
    assert!(calls("x = fact  (2)", "fact"));
    assert!(!calls("return factorial(n)", "fact"));
    assert!(!calls("return my_fact(n)", "fact"));
    assert!(!calls("return fact", "fact"));
    let shadowed = "def fact(n):\n    return math_fact(n)\n";
    assert!(!detect("recursion", shadowed));
  }

  #[test]
  fn formatting_and_output() {
    assert!(detect("f-strings", "print(f\"hi {name}\")"));
    assert!(detect("string formatting", "'{} {}'.format(a, b)"));
    assert!(detect("output", "print('x')"));
    assert!(!detect("output", "# print('x')"));
  }

  #[test]
  fn unknown_tags_fall_back_to_literal_search() {
    assert!(detect("Enumerate", "for i, v in enumerate(xs):\n    pass\n"));
    assert!(!detect("zip", "print(1)"));
  }

  #[test]
  fn missing_keeps_challenge_order() {
    let concepts = vec!["Loops".to_string(), "Variables".to_string(), "Functions".to_string()];
    assert_eq!(missing_concepts(&concepts, "x = 1"), vec!["Loops", "Functions"]);
  }
}
