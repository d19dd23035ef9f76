//! Symbol body extraction (spec.md §6.1 `get_symbol_body`).
//!
//! Detecting where a symbol's syntactic body ends without a full parse is
//! delegated to one of three heuristics dispatched by language, following
//! the three-way split the original indexer uses: indentation for
//! Python, brace-matching for C-family/brace languages, and a
//! language-agnostic indentation fallback for everything else.

/// Languages whose body ends are detected by counting braces rather than
/// indentation.
const BRACE_LANGUAGES: &[&str] = &[
    "javascript",
    "typescript",
    "java",
    "c",
    "cpp",
    "rust",
    "go",
];

/// Returns the 1-indexed line number of the last line belonging to the
/// symbol body starting at `start_line` (1-indexed). `lines` holds the
/// whole file split on newlines, no trailing line terminators.
pub fn detect_body_end(lines: &[String], start_line: u32, language: &str) -> u32 {
    let start_idx = start_line.saturating_sub(1) as usize;
    if start_idx >= lines.len() {
        return start_line;
    }

    if language == "python" {
        detect_indent_body_end(lines, start_idx)
    } else if BRACE_LANGUAGES.contains(&language) {
        detect_brace_body_end(lines, start_idx)
    } else {
        detect_indent_body_end(lines, start_idx)
    }
}

fn detect_indent_body_end(lines: &[String], start_idx: usize) -> u32 {
    let start_line_text = lines[start_idx].trim_end();
    if start_line_text.is_empty() {
        return (start_idx + 1) as u32;
    }
    let start_indent = indent_of(start_line_text);

    // Track the last non-blank line seen so a blank line immediately
    // before a dedent doesn't get counted as part of the body.
    let mut last_content_idx = start_idx;
    for (i, line) in lines.iter().enumerate().skip(start_idx + 1) {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        if indent_of(trimmed) <= start_indent {
            return (last_content_idx + 1) as u32;
        }
        last_content_idx = i;
    }
    lines.len() as u32
}

fn detect_brace_body_end(lines: &[String], start_idx: usize) -> u32 {
    let mut depth = 0i32;
    let mut found_opening = false;

    for (i, line) in lines.iter().enumerate().skip(start_idx) {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    found_opening = true;
                }
                '}' => {
                    depth -= 1;
                    if found_opening && depth == 0 {
                        return (i + 1) as u32;
                    }
                }
                _ => {}
            }
        }
    }
    lines.len() as u32
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_of(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn python_body_ends_at_dedent() {
        let lines = lines_of("def foo():\n    return 1\n\ndef bar():\n    return 2\n");
        assert_eq!(detect_body_end(&lines, 1, "python"), 2);
    }

    #[test]
    fn brace_body_ends_after_matching_close() {
        let lines = lines_of("fn foo() {\n    1\n}\nfn bar() {}\n");
        assert_eq!(detect_body_end(&lines, 1, "rust"), 3);
    }

    #[test]
    fn unknown_language_falls_back_to_indent() {
        let lines = lines_of("foo:\n  bar\nbaz:\n  qux\n");
        assert_eq!(detect_body_end(&lines, 1, "yaml"), 2);
    }
}
