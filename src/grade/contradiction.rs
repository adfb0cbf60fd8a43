#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Full-mark scores paired with critical feedback.
//!
//! A completion sometimes awards every point for a criterion while its own
//! feedback describes a defect. When that happens the score is lowered by one
//! point. This is a keyword heuristic with known false positives ("nothing
//! missing") and false negatives; the pattern list is versioned so changes to
//! it show up in the normalizer logs.

use std::sync::LazyLock;

use regex::{RegexSet, RegexSetBuilder};
use serde_json::{Map, Value};

use super::normalize::{as_number, number_value};

/// Version of [`DEFICIENCY_PATTERNS`]. Bump whenever the list changes.
pub const PATTERN_SET_VERSION: u32 = 1;

/// Case-insensitive patterns that indicate the feedback describes a defect.
pub const DEFICIENCY_PATTERNS: &[&str] = &[
    r"\bbut\b",
    r"\bhowever\b",
    r"\bmissing\b",
    r"\bincomplete\b",
    r"\black(?:s|ing)?\b",
    r"\bincorrect(?:ly)?\b",
    r"\bdid\s+not\b",
    r"\bdidn'?t\b",
    r"\bfailed\s+to\b",
    r"\bfails\s+to\b",
    r"\bweak(?:ness|nesses)?\b",
    r"\binsufficient\b",
    r"\bcould\s+(?:be\s+)?improve",
    r"\bneeds?\s+(?:more|to|improvement)\b",
    r"\bshould\s+have\b",
    r"\bnot\s+(?:fully|enough|clear|clearly)\b",
    r"\binaccura(?:te|cy)\b",
    r"\berrors?\b",
    r"\bunclear\b",
    r"\bvague\b",
];

/// Compiled form of [`DEFICIENCY_PATTERNS`].
static DEFICIENCY_SET: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSetBuilder::new(DEFICIENCY_PATTERNS)
        .case_insensitive(true)
        .build()
        .expect("deficiency patterns are valid regular expressions")
});

/// Whether feedback text contains any deficiency pattern.
pub fn indicates_deficiency(feedback: &str) -> bool {
    DEFICIENCY_SET.is_match(feedback)
}

/// Lowers by one point (never below zero) every criterion whose score equals
/// its maximum while its feedback indicates a deficiency.
///
/// Returns the names of the adjusted criteria, in breakdown order.
pub fn resolve_contradictions(breakdown: &mut Map<String, Value>) -> Vec<String> {
    let mut adjusted = Vec::new();

    for (name, criterion) in breakdown.iter_mut() {
        let Some(object) = criterion.as_object_mut() else {
            continue;
        };
        let (Some(score), Some(max_points)) = (
            object.get("score").and_then(as_number),
            object.get("max_points").and_then(as_number),
        ) else {
            continue;
        };
        if score != max_points {
            continue;
        }

        let feedback = object
            .get("feedback")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if indicates_deficiency(feedback) {
            tracing::debug!(criterion = %name, feedback, "Full marks with critical feedback");
            object.insert("score".into(), number_value((score - 1.0).max(0.0)));
            adjusted.push(name.clone());
        }
    }

    adjusted
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn breakdown(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn clean_praise_is_left_alone() {
        let mut criteria = breakdown(json!({
            "Depth": {"score": 10, "max_points": 10, "feedback": "Excellent and thorough."}
        }));

        assert!(resolve_contradictions(&mut criteria).is_empty());
        assert_eq!(criteria["Depth"]["score"], json!(10));
    }

    #[test]
    fn full_marks_with_criticism_lose_a_point() {
        let mut criteria = breakdown(json!({
            "Sources": {"score": 10, "max_points": 10, "feedback": "Good, but citations are missing."}
        }));

        assert_eq!(resolve_contradictions(&mut criteria), vec!["Sources".to_string()]);
        assert_eq!(criteria["Sources"]["score"], json!(9));
    }

    #[test]
    fn keyword_match_is_case_insensitive_and_whole_word() {
        assert!(indicates_deficiency("HOWEVER, the argument drifts."));
        assert!(indicates_deficiency("Great job, nothing missing."));
        assert!(indicates_deficiency("The student did  not cite sources."));
        assert!(!indicates_deficiency("Press the button to butter the toast."));
        assert!(!indicates_deficiency("Excellent and thorough."));
    }

    #[test]
    fn partial_scores_are_kept_and_floor_is_zero() {
        let mut criteria = breakdown(json!({
            "Partial": {"score": 6, "max_points": 10, "feedback": "Missing a conclusion."},
            "Empty": {"score": 0, "max_points": 0, "feedback": "Incomplete."},
            "Odd": "not a criterion"
        }));

        let adjusted = resolve_contradictions(&mut criteria);
        assert_eq!(adjusted, vec!["Empty".to_string()]);
        assert_eq!(criteria["Partial"]["score"], json!(6));
        assert_eq!(criteria["Empty"]["score"], json!(0));
    }

    #[test]
    fn pattern_list_is_pinned_to_its_version() {
        // bump the version together with this count whenever the list changes
        assert_eq!((PATTERN_SET_VERSION, DEFICIENCY_PATTERNS.len()), (1, 20));
        assert_eq!(DEFICIENCY_SET.len(), DEFICIENCY_PATTERNS.len());
    }
}
