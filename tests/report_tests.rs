use autograde::{
    GradingOutcome, GradingReport, GradingResult, ParseFailure, grade::report::render_text_report,
};
use serde_json::{Value, json};

fn sample_result() -> GradingResult {
    GradingResult::from_value(&json!({
        "student_name": "Ada",
        "total_score": 17,
        "max_score": 20,
        "percentage": 85,
        "rubric_breakdown": {
            "Thesis": {"score": 9, "max_points": 10, "feedback": "Sharp claim."},
            "Evidence": {"score": 8, "max_points": 10, "feedback": "Two strong sources."}
        },
        "strengths": ["Confident voice"],
        "improvements": [],
        "overall_feedback": "A focused essay."
    }))
}

#[test]
fn text_report_sections_appear_in_order() {
    let text = render_text_report(&sample_result());

    let markers = [
        "GRADING REPORT",
        "Student: Ada",
        "Score: 17/20 (85%)",
        "RUBRIC BREAKDOWN",
        "Thesis: 9/10",
        "Evidence: 8/10",
        "STRENGTHS",
        "- Confident voice",
        "AREAS FOR IMPROVEMENT",
        "(none)",
        "OVERALL FEEDBACK",
        "A focused essay.",
        "END OF REPORT",
    ];
    let mut from = 0;
    for marker in markers {
        let at = text[from..]
            .find(marker)
            .unwrap_or_else(|| panic!("{marker:?} missing or out of order in:\n{text}"));
        from += at + marker.len();
    }
}

#[test]
fn graded_report_serializes_flat_with_metadata() {
    let report = GradingReport::new(GradingOutcome::Graded(sample_result()), "gpt-4o-mini");
    let value: Value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["student_name"], "Ada");
    assert_eq!(value["percentage"], 85);
    assert_eq!(value["rubric_breakdown"]["Thesis"]["score"], 9.0);
    assert_eq!(value["model_id"], "gpt-4o-mini");
    assert!(value["graded_at"].is_string());
    assert!(
        value["report_text"]
            .as_str()
            .is_some_and(|text| text.contains("GRADING REPORT"))
    );
}

#[test]
fn failed_report_carries_raw_response_only() {
    let failure = ParseFailure {
        raw_response: "I'd give it a B+.".into(),
        parse_error:  "Could not parse model response as JSON".into(),
    };
    let report = GradingReport::new(GradingOutcome::Failed(failure), "claude");
    let value: Value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["raw_response"], "I'd give it a B+.");
    assert_eq!(value["parse_error"], "Could not parse model response as JSON");
    assert_eq!(value["model_id"], "claude");
    assert!(value.get("total_score").is_none());
    assert!(value.get("report_text").is_none());
}
