#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Recovery for completions cut off by a generation limit.
//!
//! Only truncation artifacts are repaired: an unterminated string, a
//! dangling comma, and unclosed arrays or objects. Balanced input that is
//! invalid for other reasons (unquoted keys, comments) is left to fail.

use std::iter::repeat_n;

use serde_json::Value;

use super::results::ParseOutcome;

/// Message carried by every unrecoverable parse.
pub const PARSE_FAILURE_MESSAGE: &str = "Could not parse model response as JSON";

/// Parses a candidate into a JSON object, repairing truncation if needed.
///
/// The text up to the last `}` is tried first; if that fails the whole
/// candidate goes through [`repair_truncated_json`]. `raw_text` is only
/// carried into the failure value.
pub fn parse_candidate(candidate: &str, raw_text: &str) -> ParseOutcome {
    if let Some(end) = candidate.rfind('}')
        && let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&candidate[..=end])
    {
        return ParseOutcome::Parsed(value);
    }

    let repaired = repair_truncated_json(candidate);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value @ Value::Object(_)) => {
            tracing::info!(
                added = repaired.len().saturating_sub(candidate.trim_end().len()),
                "Recovered truncated completion"
            );
            ParseOutcome::Parsed(value)
        }
        Ok(_) | Err(_) => ParseOutcome::Failed {
            raw_text: raw_text.to_owned(),
            message:  PARSE_FAILURE_MESSAGE.to_owned(),
        },
    }
}

/// String state at the end of a scan.
#[derive(Debug, Default, Clone, Copy)]
struct StringScan {
    /// The text ends inside an open string literal.
    in_string:       bool,
    /// The text ends right after an unescaped backslash inside a string.
    dangling_escape: bool,
}

/// Tracks whether the end of `text` falls inside a double-quoted string.
/// Escaped quotes never toggle the state.
fn scan_strings(text: &str) -> StringScan {
    let mut scan = StringScan::default();
    for c in text.chars() {
        if scan.dangling_escape {
            scan.dangling_escape = false;
            continue;
        }
        match c {
            '\\' if scan.in_string => scan.dangling_escape = true,
            '"' => scan.in_string = !scan.in_string,
            _ => {}
        }
    }
    scan
}

/// Counts `{` and `[` left open outside of string literals.
fn unmatched_delimiters(text: &str) -> (usize, usize) {
    let mut braces = 0usize;
    let mut brackets = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            _ if in_string => {}
            '{' => braces += 1,
            '}' => braces = braces.saturating_sub(1),
            '[' => brackets += 1,
            ']' => brackets = brackets.saturating_sub(1),
            _ => {}
        }
    }

    (braces, brackets)
}

/// Removes trailing whitespace and one trailing comma.
fn strip_trailing_comma(text: &mut String) {
    let trimmed = text.trim_end().len();
    text.truncate(trimmed);
    if text.ends_with(',') {
        text.pop();
        let trimmed = text.trim_end().len();
        text.truncate(trimmed);
    }
}

/// Closes whatever a truncated JSON document left open.
///
/// An open string gets its closing quote, a dangling comma is dropped, then
/// `]` is appended for each open array and `}` for each open object. Arrays
/// close first because in grading output array values sit inside objects.
pub fn repair_truncated_json(candidate: &str) -> String {
    let mut repaired = candidate.trim_end().to_owned();

    let scan = scan_strings(&repaired);
    if scan.in_string {
        if scan.dangling_escape {
            repaired.pop();
        }
        repaired.push('"');
    }
    strip_trailing_comma(&mut repaired);

    let (braces, brackets) = unmatched_delimiters(&repaired);
    strip_trailing_comma(&mut repaired);

    repaired.extend(repeat_n(']', brackets));
    repaired.extend(repeat_n('}', braces));
    repaired
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parsed(candidate: &str) -> Value {
        match parse_candidate(candidate, candidate) {
            ParseOutcome::Parsed(value) => value,
            ParseOutcome::Failed { message, .. } => panic!("{candidate:?} failed: {message}"),
        }
    }

    #[test]
    fn truncated_nested_object_is_closed() {
        assert_eq!(repair_truncated_json(r#"{"a":{"b":1"#), r#"{"a":{"b":1}}"#);
        assert_eq!(parsed(r#"{"a":{"b":1"#), json!({"a": {"b": 1}}));
    }

    #[test]
    fn dangling_comma_is_removed() {
        assert_eq!(repair_truncated_json(r#"{"a":1,"#), r#"{"a":1}"#);
        assert_eq!(parsed("{\"a\":1,  \n"), json!({"a": 1}));
    }

    #[test]
    fn open_string_is_closed_before_delimiters() {
        let cut = r#"{"overall_feedback":"Solid work, bu"#;
        assert_eq!(parsed(cut), json!({"overall_feedback": "Solid work, bu"}));

        let in_array = r#"{"strengths":["clear thesis","good flo"#;
        assert_eq!(parsed(in_array), json!({"strengths": ["clear thesis", "good flo"]}));
    }

    #[test]
    fn escaped_quotes_do_not_toggle_string_state() {
        let cut = r#"{"feedback":"uses \"quotes\" and { braces"#;
        assert_eq!(parsed(cut), json!({"feedback": "uses \"quotes\" and { braces"}));

        let dangling = "{\"feedback\":\"ends mid escape \\";
        assert_eq!(parsed(dangling), json!({"feedback": "ends mid escape "}));
    }

    #[test]
    fn trailing_text_after_complete_object_is_ignored() {
        assert_eq!(parsed(r#"{"a": 1} Let me know if you need more."#), json!({"a": 1}));
    }

    #[test]
    fn balanced_but_invalid_json_is_not_rescued() {
        let outcome = parse_candidate("{a: 1}", "raw reply");
        assert_eq!(
            outcome,
            ParseOutcome::Failed {
                raw_text: "raw reply".into(),
                message:  PARSE_FAILURE_MESSAGE.into(),
            }
        );
    }

    #[test]
    fn non_objects_are_failures() {
        assert!(matches!(parse_candidate("[1, 2", "x"), ParseOutcome::Failed { .. }));
        assert!(matches!(parse_candidate("no json here", "x"), ParseOutcome::Failed { .. }));
    }
}
