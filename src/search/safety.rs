//! Heuristic regex-safety check (spec.md §4.7): reject patterns whose
//! shape is a known catastrophic-backtracking trigger before they ever
//! reach the regex engine. `regex` itself doesn't backtrack (it's a
//! linear-time automaton), but a caller authoring a pattern the engine
//! silently "fixes" the semantics of is arguably worse than an explicit
//! rejection, so the heuristic still runs.

use std::sync::LazyLock;

use regex::Regex;

static NESTED_QUANTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*[+*][^)]*\)[+*]").unwrap());

/// True when `pattern` matches a known catastrophic-backtracking shape:
/// a nested unbounded quantifier like `(a+)+`, or repeated alternation
/// like `(a|a)+`.
pub fn is_unsafe_pattern(pattern: &str) -> bool {
    if NESTED_QUANTIFIER.is_match(pattern) {
        return true;
    }
    has_repeated_group_alternation(pattern)
}

/// A simpler structural check than the regex above: find a parenthesized
/// group containing `|` that is itself immediately followed by `+` or
/// `*`. Covers `(a|ab)*` style patterns without needing backreferences,
/// which the `regex` crate's syntax doesn't support anyway.
fn has_repeated_group_alternation(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    let mut depth = 0i32;
    let mut group_start: Option<usize> = None;
    let mut has_alt = false;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => {
                if depth == 0 {
                    group_start = Some(i);
                    has_alt = false;
                }
                depth += 1;
            }
            b')' => {
                depth -= 1;
                if depth == 0 && group_start.is_some() {
                    let quantified = bytes.get(i + 1).is_some_and(|&q| q == b'+' || q == b'*');
                    if quantified && has_alt {
                        return true;
                    }
                    group_start = None;
                }
            }
            b'|' if depth == 1 => has_alt = true,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_nested_unbounded_quantifiers() {
        assert!(is_unsafe_pattern("(a+)+$"));
        assert!(is_unsafe_pattern("(a*)*"));
    }

    #[test]
    fn flags_repeated_alternation() {
        assert!(is_unsafe_pattern("(a|ab)*"));
    }

    #[test]
    fn allows_ordinary_patterns() {
        assert!(!is_unsafe_pattern(r"fn\s+\w+"));
        assert!(!is_unsafe_pattern(r"[A-Za-z_][A-Za-z0-9_]*"));
    }
}
