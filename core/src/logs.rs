//! Log line filtering and tail truncation.

use regex::{Regex, RegexBuilder};

use crate::error::Result;

/// Compiles a caller-supplied, case-insensitive log filter.
///
/// Validated before any tilt call so a bad pattern costs no round-trip.
pub fn build_filter(pattern: &str) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

/// Applies an optional filter, then keeps the last `tail` lines.
///
/// Filtering happens first: the result is the tail of the matching lines,
/// not a filtered tail. `tail` of zero means no truncation.
pub fn select_lines(text: &str, filter: Option<&Regex>, tail: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| filter.map_or(true, |r| r.is_match(line)))
        .collect();

    let start = if tail == 0 {
        0
    } else {
        lines.len().saturating_sub(tail)
    };
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(build_filter("error|warn").is_ok());
        assert!(build_filter("(unclosed").is_err());
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let filter = build_filter("error").unwrap();
        let out = select_lines("ok\nERROR: boom\nfine\nError again", Some(&filter), 0);
        assert_eq!(out, "ERROR: boom\nError again");
    }

    #[test]
    fn test_tail_applies_after_filter() {
        // 1500 lines, every third one matching; the tail must come from the
        // matching lines, not from the raw text.
        let text: Vec<String> = (0..1500)
            .map(|i| {
                if i % 3 == 0 {
                    format!("line {i} error")
                } else if i % 3 == 1 {
                    format!("line {i} warn")
                } else {
                    format!("line {i} info")
                }
            })
            .collect();
        let text = text.join("\n");

        let filter = build_filter("error|warn").unwrap();
        let out = select_lines(&text, Some(&filter), 50);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 50);
        assert!(lines.iter().all(|l| l.contains("error") || l.contains("warn")));
        assert_eq!(*lines.last().unwrap(), "line 1498 warn");
        assert_eq!(lines[0], "line 1425 error");
    }

    #[test]
    fn test_tail_without_filter() {
        let out = select_lines("a\nb\nc\nd", None, 2);
        assert_eq!(out, "c\nd");
    }

    #[test]
    fn test_tail_larger_than_input() {
        let out = select_lines("a\nb", None, 10);
        assert_eq!(out, "a\nb");
    }
}
