#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Rubric arithmetic for parsed completions.
//!
//! The input is whatever object the completion produced, so every field is
//! checked for presence and type before use. After [`normalize_result`] runs
//! on an object with a `rubric_breakdown`:
//!
//! * criterion `max_points` sum to the target maximum (unless the raw sum or
//!   the target was zero or negative, which is left as-is),
//! * no criterion has negative `max_points` after a rescale,
//! * every score lies in `[0, max_points]`,
//! * `total_score` is the sum of scores and never exceeds `max_score`,
//! * `percentage` is `round(total_score / max_score * 100)`, at most 100.

use serde_json::{Map, Value};

use super::contradiction::{PATTERN_SET_VERSION, resolve_contradictions};

/// Name used when neither the completion nor the caller supplies one.
pub const ANONYMOUS: &str = "Anonymous";

/// Reads a number, accepting numeric strings such as `"8"` or `" 7.5 "`.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Encodes a number, keeping whole values as JSON integers.
pub fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        Value::from(number as i64)
    } else {
        Value::from(number)
    }
}

/// Runs every normalization step on a parsed completion, in order:
/// student name default, rescale, contradiction repair, clamp, totals.
///
/// Objects without a `rubric_breakdown` only get the student name default.
pub fn normalize_result(value: &mut Value, max_score: f64, fallback_name: &str) {
    let Some(root) = value.as_object_mut() else {
        return;
    };

    default_student_name(root, fallback_name);

    let Some(breakdown) = root
        .get_mut("rubric_breakdown")
        .and_then(Value::as_object_mut)
    else {
        return;
    };

    rescale_rubric(breakdown, max_score);
    let adjusted = resolve_contradictions(breakdown);
    if !adjusted.is_empty() {
        tracing::info!(
            criteria = ?adjusted,
            pattern_set = PATTERN_SET_VERSION,
            "Lowered full-mark scores that had critical feedback"
        );
    }
    clamp_scores(breakdown);
    recompute_totals(root, max_score);
}

/// Fills in `student_name` when it is missing, blank, or the placeholder.
pub fn default_student_name(root: &mut Map<String, Value>, fallback_name: &str) {
    let current = root
        .get("student_name")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    if current.is_empty() || current == ANONYMOUS {
        let fallback = fallback_name.trim();
        let name = if fallback.is_empty() { ANONYMOUS } else { fallback };
        root.insert("student_name".into(), Value::from(name));
    }
}

/// Sum of all numeric `max_points` in the breakdown.
pub fn raw_max_sum(breakdown: &Map<String, Value>) -> f64 {
    breakdown
        .values()
        .filter_map(|criterion| criterion.get("max_points").and_then(as_number))
        .sum()
}

/// Rescales criterion points so they add up to `max_score`.
///
/// Returns `false` without touching anything when the raw sum already equals
/// `max_score`, or when either of them is not positive.
pub fn rescale_rubric(breakdown: &mut Map<String, Value>, max_score: f64) -> bool {
    let raw_sum = raw_max_sum(breakdown);
    if raw_sum <= 0.0 {
        tracing::warn!(
            raw_sum,
            max_score,
            "Rubric max points do not sum to a positive value; skipping rescale"
        );
        return false;
    }
    if !max_score.is_finite() || max_score <= 0.0 {
        tracing::warn!(raw_sum, max_score, "Target maximum is not positive; skipping rescale");
        return false;
    }
    if raw_sum == max_score {
        return false;
    }

    tracing::info!(raw_sum, max_score, "Rescaling rubric to target maximum");

    for criterion in breakdown.values_mut() {
        let Some(object) = criterion.as_object_mut() else {
            continue;
        };
        let Some(old_max) = object.get("max_points").and_then(as_number) else {
            continue;
        };
        if old_max == 0.0 {
            continue;
        }

        let new_max = (old_max / raw_sum * max_score).round().max(0.0);
        let old_score = object.get("score").and_then(as_number).unwrap_or(0.0);
        let new_score = (old_score / old_max * new_max).round();

        object.insert("max_points".into(), number_value(new_max));
        object.insert("score".into(), number_value(new_score));
    }

    // independent rounding can leave a residual
    let residual = max_score - raw_max_sum(breakdown);
    if residual != 0.0 {
        absorb_residual(breakdown, residual);
    }

    true
}

/// Moves a rounding residual onto the largest criterion, the last one on
/// ties.
///
/// A negative residual never takes a criterion below zero: whatever the
/// largest criterion cannot give up is taken one point at a time from the
/// next-largest criteria, in breakdown order. Scores above a lowered maximum
/// are pulled down with it.
fn absorb_residual(breakdown: &mut Map<String, Value>, residual: f64) {
    let mut ranked: Vec<(String, f64)> = breakdown
        .iter()
        .filter_map(|(name, criterion)| {
            let points = criterion.get("max_points").and_then(as_number)?;
            Some((name.clone(), points))
        })
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let Some(&(_, top)) = ranked.first() else {
        return;
    };
    if let Some(last_top) = ranked.iter().rposition(|(_, points)| *points == top) {
        let largest = ranked.remove(last_top);
        ranked.insert(0, largest);
    }

    let mut remaining = residual;
    let first = &mut ranked[0].1;
    let adjusted = if remaining > 0.0 {
        *first + remaining
    } else {
        (*first + remaining).max(0.0)
    };
    remaining -= adjusted - *first;
    *first = adjusted;

    while remaining < 0.0 {
        let mut moved = false;
        for (_, points) in ranked.iter_mut().skip(1) {
            if remaining >= 0.0 {
                break;
            }
            let step = (-remaining).min(1.0).min(*points);
            if step > 0.0 {
                *points -= step;
                remaining += step;
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }

    for (name, points) in ranked {
        let Some(object) = breakdown.get_mut(&name).and_then(Value::as_object_mut) else {
            continue;
        };
        object.insert("max_points".into(), number_value(points));
        if let Some(score) = object.get("score").and_then(as_number)
            && score > points
        {
            object.insert("score".into(), number_value(points));
        }
    }
}

/// Clamps every score into `[0, max_points]`, coercing numeric strings.
pub fn clamp_scores(breakdown: &mut Map<String, Value>) {
    for criterion in breakdown.values_mut() {
        let Some(object) = criterion.as_object_mut() else {
            continue;
        };
        let max_points = object
            .get("max_points")
            .and_then(as_number)
            .unwrap_or(0.0);
        let score = object.get("score").and_then(as_number).unwrap_or(0.0);
        let clamped = score.max(0.0).min(max_points.max(0.0));

        object.insert("max_points".into(), number_value(max_points));
        object.insert("score".into(), number_value(clamped));
    }
}

/// Recomputes `total_score`, `max_score` and `percentage` from the breakdown.
pub fn recompute_totals(root: &mut Map<String, Value>, max_score: f64) {
    let total: f64 = root
        .get("rubric_breakdown")
        .and_then(Value::as_object)
        .map(|breakdown| {
            breakdown
                .values()
                .filter_map(|criterion| criterion.get("score").and_then(as_number))
                .sum()
        })
        .unwrap_or(0.0);

    let total = total.min(max_score);
    let percentage = if max_score > 0.0 {
        (total / max_score * 100.0).round().clamp(0.0, 100.0)
    } else {
        0.0
    };

    root.insert("total_score".into(), number_value(total));
    root.insert("max_score".into(), number_value(max_score));
    root.insert("percentage".into(), number_value(percentage));
}
