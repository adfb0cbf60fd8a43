#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fmt::Display, str::FromStr};

use bon::Builder;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::normalize::{ANONYMOUS, as_number};

/// Grading strictness requested by the caller. Only shapes the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leniency {
    /// Deduct for every deviation from the rubric.
    Strict,
    /// Balanced grading.
    #[default]
    Normal,
    /// Give the benefit of the doubt.
    Lenient,
    /// Reward effort and partial understanding generously.
    VeryLenient,
}

impl FromStr for Leniency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "strict" => Ok(Leniency::Strict),
            "normal" => Ok(Leniency::Normal),
            "lenient" => Ok(Leniency::Lenient),
            "very_lenient" => Ok(Leniency::VeryLenient),
            other => Err(format!(
                "unknown leniency `{other}` (expected strict, normal, lenient or very_lenient)"
            )),
        }
    }
}

impl Display for Leniency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Leniency::Strict => "strict",
            Leniency::Normal => "normal",
            Leniency::Lenient => "lenient",
            Leniency::VeryLenient => "very_lenient",
        };
        write!(f, "{name}")
    }
}

/// One criterion of a caller-supplied rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricItem {
    /// Criterion name.
    pub name:        String,
    /// Points available for the criterion.
    pub max_points:  f64,
    /// What the criterion looks for, if given.
    pub description: Option<String>,
}

/// The rubric a submission is graded against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RubricInput {
    /// Named criteria with explicit point values.
    Structured(Vec<RubricItem>),
    /// Free text the backend is asked to structure itself.
    Freeform(String),
}

impl RubricInput {
    /// Interprets rubric text: a JSON object or array of criteria becomes a
    /// structured rubric, anything else is kept as freeform text.
    ///
    /// Accepted structured shapes are `{"Name": 10}`,
    /// `{"Name": {"max_points": 10, "description": "..."}}` and
    /// `[{"name": "Name", "points": 10}]`.
    pub fn from_text(text: &str) -> Self {
        let items = match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Object(map)) => map
                .iter()
                .filter_map(|(name, entry)| rubric_item(name.clone(), entry))
                .collect::<Vec<_>>(),
            Ok(Value::Array(entries)) => entries
                .iter()
                .filter_map(|entry| {
                    let name = entry.get("name")?.as_str()?.to_owned();
                    rubric_item(name, entry)
                })
                .collect(),
            _ => Vec::new(),
        };

        if items.is_empty() {
            RubricInput::Freeform(text.trim().to_owned())
        } else {
            RubricInput::Structured(items)
        }
    }
}

/// Reads one rubric entry from either a bare number or an object.
fn rubric_item(name: String, entry: &Value) -> Option<RubricItem> {
    if let Some(points) = as_number(entry) {
        return Some(RubricItem {
            name,
            max_points: points,
            description: None,
        });
    }

    let entry = entry.as_object()?;
    let max_points = ["max_points", "points", "max"]
        .iter()
        .find_map(|key| entry.get(*key).and_then(as_number))?;
    let description = entry
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_owned);

    Some(RubricItem {
        name,
        max_points,
        description,
    })
}

/// Everything needed to grade one submission.
#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct PipelineRequest {
    /// Rubric to grade against, if any.
    pub rubric:       Option<RubricInput>,
    /// Assignment instructions.
    #[builder(default)]
    pub instructions: String,
    /// The submission text.
    pub submission:   String,
    /// Extra note from the instructor.
    pub note:         Option<String>,
    /// Score the rubric is scaled to.
    #[builder(default = 100.0)]
    pub max_score:    f64,
    /// Student name used when the completion omits one.
    #[builder(default)]
    pub student_name: String,
    /// Grading strictness.
    #[builder(default)]
    pub leniency:     Leniency,
}

/// One scored rubric criterion. The name is the key in
/// [`GradingResult::rubric_breakdown`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricCriterion {
    /// Points awarded.
    pub score:      f64,
    /// Points available.
    pub max_points: f64,
    /// Feedback for this criterion.
    #[serde(default)]
    pub feedback:   String,
}

impl RubricCriterion {
    /// Reads a criterion from an untyped object; absent or non-numeric fields
    /// become zero or empty.
    fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            score:      object.get("score").and_then(as_number).unwrap_or(0.0),
            max_points: object.get("max_points").and_then(as_number).unwrap_or(0.0),
            feedback:   object
                .get("feedback")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        }
    }
}

/// A finished, schema-valid grading result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    /// Name of the graded student.
    pub student_name:     String,
    /// Sum of all criterion scores.
    pub total_score:      f64,
    /// Maximum achievable score.
    pub max_score:        f64,
    /// Rounded percentage, `0..=100`.
    pub percentage:       u32,
    /// Criteria in the order the completion listed them.
    pub rubric_breakdown: IndexMap<String, RubricCriterion>,
    /// What the submission did well.
    pub strengths:        Vec<String>,
    /// What the submission should improve.
    pub improvements:     Vec<String>,
    /// Summary feedback.
    pub overall_feedback: String,
}

impl GradingResult {
    /// Converts a normalized completion object into a typed result.
    ///
    /// Every field is optional in the input; missing values default to zero
    /// or empty, and a missing percentage is derived from the totals.
    pub fn from_value(value: &Value) -> Self {
        let rubric_breakdown = value
            .get("rubric_breakdown")
            .and_then(Value::as_object)
            .map(|criteria| {
                criteria
                    .iter()
                    .filter_map(|(name, criterion)| {
                        criterion
                            .as_object()
                            .map(|object| (name.clone(), RubricCriterion::from_object(object)))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let total_score = value.get("total_score").and_then(as_number).unwrap_or(0.0);
        let max_score = value.get("max_score").and_then(as_number).unwrap_or(0.0);
        let percentage = value
            .get("percentage")
            .and_then(as_number)
            .unwrap_or_else(|| {
                if max_score > 0.0 {
                    total_score / max_score * 100.0
                } else {
                    0.0
                }
            })
            .round()
            .clamp(0.0, 100.0) as u32;

        Self {
            student_name: value
                .get("student_name")
                .and_then(Value::as_str)
                .unwrap_or(ANONYMOUS)
                .to_owned(),
            total_score,
            max_score,
            percentage,
            rubric_breakdown,
            strengths: string_list(value.get("strengths")),
            improvements: string_list(value.get("improvements")),
            overall_feedback: value
                .get("overall_feedback")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        }
    }
}

/// Collects the string entries of an array; anything else is empty.
fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Result of turning a candidate string into a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// A JSON object was recovered.
    Parsed(Value),
    /// Nothing usable could be recovered.
    Failed {
        /// The completion text as the backend returned it.
        raw_text: String,
        /// Why parsing failed.
        message:  String,
    },
}

/// Diagnostic payload returned when no attempt produced a usable result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseFailure {
    /// The first completion text, kept so a human can still read it.
    pub raw_response: String,
    /// Why parsing failed.
    pub parse_error:  String,
}

/// Terminal value of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GradingOutcome {
    /// A consistent grading result.
    Graded(GradingResult),
    /// Both attempts failed to parse.
    Failed(ParseFailure),
}

impl GradingOutcome {
    /// Returns the grading result, if parsing succeeded.
    pub fn result(&self) -> Option<&GradingResult> {
        match self {
            GradingOutcome::Graded(result) => Some(result),
            GradingOutcome::Failed(_) => None,
        }
    }

    /// Returns the failure payload, if parsing failed.
    pub fn failure(&self) -> Option<&ParseFailure> {
        match self {
            GradingOutcome::Graded(_) => None,
            GradingOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// Outcome plus the metadata handed to callers and persistence.
#[derive(Debug, Clone, Serialize)]
pub struct GradingReport {
    /// Result or failure payload, flattened into the report.
    #[serde(flatten)]
    pub outcome:     GradingOutcome,
    /// Human-readable report, present only for graded outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_text: Option<String>,
    /// Model identifier that produced the completion.
    pub model_id:    String,
    /// When grading finished.
    pub graded_at:   DateTime<Utc>,
}

impl GradingReport {
    /// Wraps an outcome, rendering the text report for graded outcomes.
    pub fn new(outcome: GradingOutcome, model_id: impl Into<String>) -> Self {
        let report_text = outcome.result().map(super::report::render_text_report);
        Self {
            outcome,
            report_text,
            model_id: model_id.into(),
            graded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn leniency_accepts_dashes_and_case() {
        assert_eq!("Very-Lenient".parse::<Leniency>(), Ok(Leniency::VeryLenient));
        assert_eq!("strict".parse::<Leniency>(), Ok(Leniency::Strict));
        assert!("harsh".parse::<Leniency>().is_err());
    }

    #[test]
    fn rubric_text_shapes() {
        let structured = RubricInput::from_text(
            r#"{"Thesis": 10, "Evidence": {"points": "20", "description": "Cites sources"}}"#,
        );
        let RubricInput::Structured(items) = structured else {
            panic!("expected structured rubric");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Thesis");
        assert_eq!(items[1].max_points, 20.0);
        assert_eq!(items[1].description.as_deref(), Some("Cites sources"));

        let listed = RubricInput::from_text(r#"[{"name": "Style", "max_points": 5}]"#);
        assert!(matches!(listed, RubricInput::Structured(ref items) if items[0].name == "Style"));

        let freeform = RubricInput::from_text("  Clarity matters most.\n");
        assert_eq!(freeform, RubricInput::Freeform("Clarity matters most.".into()));
    }

    #[test]
    fn from_value_tolerates_missing_and_mistyped_fields() {
        let value = json!({
            "total_score": "7",
            "max_score": 10,
            "rubric_breakdown": {
                "Only": {"score": 7, "max_points": 10},
                "Broken": "not an object"
            },
            "strengths": "should be a list",
            "improvements": ["cite more", null, 3]
        });

        let result = GradingResult::from_value(&value);
        assert_eq!(result.student_name, "Anonymous");
        assert_eq!(result.total_score, 7.0);
        assert_eq!(result.percentage, 70);
        assert_eq!(result.rubric_breakdown.len(), 1);
        assert_eq!(result.rubric_breakdown["Only"].feedback, "");
        assert!(result.strengths.is_empty());
        assert_eq!(result.improvements, vec!["cite more".to_string(), "3".to_string()]);
    }
}
