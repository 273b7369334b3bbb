//! Built-in micro-challenges so the service is useful without a config bank.

use crate::domain::{Challenge, Hint};

fn hints(items: &[(&str, &str)]) -> Vec<Hint> {
  items
    .iter()
    .map(|(id, text)| Hint { id: (*id).into(), text: (*text).into() })
    .collect()
}

pub fn seed_challenges() -> Vec<Challenge> {
  vec![
    Challenge {
      id: "hello-world".into(),
      title: "Hello, World!".into(),
      description: "Print the text Hello, World! exactly.".into(),
      difficulty: "beginner".into(),
      concepts: vec!["Output".into(), "Strings".into()],
      estimated_time: 2,
      xp_reward: 20,
      solution: Some("print(\"Hello, World!\")".into()),
      hints: hints(&[
        ("hello-1", "Use the print() function."),
        ("hello-2", "Text goes inside quotes: print(\"...\")."),
      ]),
      expected_output: Some("Hello, World!".into()),
      expects_output: None,
      validator: None,
    },
    Challenge {
      id: "store-a-number".into(),
      title: "Store a number".into(),
      description: "Store the number 5 in a variable called x and print it.".into(),
      difficulty: "beginner".into(),
      concepts: vec!["Variables".into()],
      estimated_time: 10,
      xp_reward: 100,
      solution: None,
      hints: hints(&[("var-1", "Assign with a single equals sign: x = 5.")]),
      expected_output: Some("5".into()),
      expects_output: None,
      validator: None,
    },
    Challenge {
      id: "count-to-five".into(),
      title: "Count to five".into(),
      description: "Print the numbers 1 to 5, one per line, using a loop.".into(),
      difficulty: "beginner".into(),
      concepts: vec!["Loops".into(), "Range".into()],
      estimated_time: 5,
      xp_reward: 50,
      solution: Some("for i in range(1, 6):\n    print(i)".into()),
      hints: hints(&[
        ("count-1", "range(1, 6) produces 1, 2, 3, 4, 5."),
        ("count-2", "Put print(i) inside the loop body."),
      ]),
      expected_output: Some("1\n2\n3\n4\n5".into()),
      expects_output: None,
      validator: None,
    },
    Challenge {
      id: "even-or-odd".into(),
      title: "Even or odd".into(),
      description: "Write a function is_even(n) that returns True for even numbers, then print is_even(4) and is_even(7).".into(),
      difficulty: "intermediate".into(),
      concepts: vec!["Functions".into(), "Return values".into(), "Operators".into()],
      estimated_time: 8,
      xp_reward: 80,
      solution: Some("def is_even(n):\n    return n % 2 == 0\n\nprint(is_even(4))\nprint(is_even(7))".into()),
      hints: hints(&[
        ("even-1", "The % operator gives the remainder of a division."),
        ("even-2", "A number is even when n % 2 == 0."),
      ]),
      expected_output: Some("True\nFalse".into()),
      expects_output: None,
      validator: None,
    },
    Challenge {
      id: "shopping-total".into(),
      title: "Shopping total".into(),
      description: "Given prices = {\"apple\": 3, \"bread\": 5, \"milk\": 2}, print the total cost.".into(),
      difficulty: "intermediate".into(),
      concepts: vec!["Dictionaries".into(), "Loops".into()],
      estimated_time: 10,
      xp_reward: 100,
      solution: Some(
        "prices = {\"apple\": 3, \"bread\": 5, \"milk\": 2}\ntotal = 0\nfor item in prices:\n    total += prices[item]\nprint(total)".into(),
      ),
      hints: hints(&[
        ("shop-1", "Looping over a dictionary gives you its keys."),
        ("shop-2", "Keep a running total and add prices[item] each time."),
      ]),
      expected_output: Some("10".into()),
      expects_output: None,
      validator: None,
    },
    Challenge {
      id: "factorial".into(),
      title: "Recursive factorial".into(),
      description: "Write a recursive function factorial(n) and print factorial(5).".into(),
      difficulty: "advanced".into(),
      concepts: vec!["Functions".into(), "Recursion".into(), "Conditionals".into()],
      estimated_time: 12,
      xp_reward: 150,
      solution: Some(
        "def factorial(n):\n    if n <= 1:\n        return 1\n    return n * factorial(n - 1)\n\nprint(factorial(5))".into(),
      ),
      hints: hints(&[
        ("fact-1", "The base case: factorial(1) is 1."),
        ("fact-2", "Otherwise return n * factorial(n - 1)."),
      ]),
      expected_output: Some("120".into()),
      expects_output: None,
      validator: None,
    },
  ]
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::concepts::missing_concepts;
  use crate::interp::Interpreter;
  use crate::interp::ResourceLimits;

  #[test]
  fn reference_solutions_produce_expected_output_and_concepts() {
    for ch in seed_challenges() {
      let Some(solution) = &ch.solution else { continue };
      let out = Interpreter::new(ResourceLimits::default()).execute(solution);
      assert!(out.fault.is_none(), "{}: {:?}", ch.id, out.fault);
      if let Some(expected) = &ch.expected_output {
        assert_eq!(out.stdout.trim(), expected, "{}", ch.id);
      }
      assert!(missing_concepts(&ch.concepts, solution).is_empty(), "{}", ch.id);
    }
  }

  #[test]
  fn ids_are_unique() {
    let seeds = seed_challenges();
    let mut ids: Vec<_> = seeds.iter().map(|c| c.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), seeds.len());
  }
}
