#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use serde_json::json;

use super::{
    normalize::{ANONYMOUS, number_value},
    results::{Leniency, PipelineRequest, RubricInput},
};

/// Role framing shared by every grading prompt.
const SYSTEM_INTRO: &str = include_str!("prompts/system_intro.md");
/// Output contract; `{schema}` and `{max_score}` are substituted.
const OUTPUT_FORMAT: &str = include_str!("prompts/output_format.md");

impl Leniency {
    /// Prompt guidance for this strictness level.
    pub fn guidance(self) -> &'static str {
        match self {
            Leniency::Strict => include_str!("prompts/leniency_strict.md"),
            Leniency::Normal => include_str!("prompts/leniency_normal.md"),
            Leniency::Lenient => include_str!("prompts/leniency_lenient.md"),
            Leniency::VeryLenient => include_str!("prompts/leniency_very_lenient.md"),
        }
    }
}

/// Assembles the grading prompt for a request.
///
/// The result is opaque to the rest of the pipeline; only the backend reads
/// it.
pub fn build_grading_prompt(request: &PipelineRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str(SYSTEM_INTRO.trim());
    prompt.push_str(&format!(
        "\n\n## Grading Strictness\n\n{}\n\n## Rubric\n\n",
        request.leniency.guidance().trim()
    ));
    prompt.push_str(&rubric_section(request.rubric.as_ref(), request.max_score));

    if !request.instructions.trim().is_empty() {
        prompt.push_str(&format!(
            "\n## Assignment Instructions\n\n{}\n",
            request.instructions.trim()
        ));
    }
    if let Some(note) = request.note.as_deref().filter(|note| !note.trim().is_empty()) {
        prompt.push_str(&format!("\n## Note From the Instructor\n\n{}\n", note.trim()));
    }

    prompt.push_str(&format!(
        "\n## Student Submission\n\n<submission>\n{}\n</submission>\n\n",
        request.submission.trim()
    ));
    prompt.push_str(&output_format(request));
    prompt
}

/// Renders the rubric section: a criterion list, free text, or a request to
/// derive criteria when no rubric was given.
fn rubric_section(rubric: Option<&RubricInput>, max_score: f64) -> String {
    let total = number_value(max_score);
    match rubric {
        Some(RubricInput::Structured(items)) => {
            let mut section = String::new();
            for item in items {
                section.push_str(&format!(
                    "- {} ({} points)",
                    item.name,
                    number_value(item.max_points)
                ));
                if let Some(description) = &item.description {
                    section.push_str(&format!(": {}", description.trim()));
                }
                section.push('\n');
            }
            let declared: f64 = items.iter().map(|item| item.max_points).sum();
            if declared != max_score {
                section.push_str(&format!(
                    "\nThe criteria above total {} points; scale them so they total {total}.\n",
                    number_value(declared)
                ));
            }
            section
        }
        Some(RubricInput::Freeform(text)) => format!(
            "{}\n\nTurn this rubric into named criteria whose points total {total}.\n",
            text.trim()
        ),
        None => format!(
            "No rubric was provided. Derive three to six criteria from the instructions whose \
             points total {total}.\n"
        ),
    }
}

/// Renders the output contract with a schema echoing the student name and
/// maximum score.
fn output_format(request: &PipelineRequest) -> String {
    let student_name = match request.student_name.trim() {
        "" => ANONYMOUS,
        name => name,
    };
    let schema = json!({
        "student_name": student_name,
        "total_score": 0,
        "max_score": number_value(request.max_score),
        "percentage": 0,
        "rubric_breakdown": {
            "Criterion name": {"score": 0, "max_points": 0, "feedback": "Why this score."}
        },
        "strengths": ["Specific strength"],
        "improvements": ["Specific, actionable improvement"],
        "overall_feedback": "Two or three sentences summarizing the grade."
    });
    let schema = serde_json::to_string_pretty(&schema).unwrap_or_else(|_| schema.to_string());

    OUTPUT_FORMAT
        .replace("{schema}", &schema)
        .replace("{max_score}", &number_value(request.max_score).to_string())
}
