#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Turning untrusted completion text into consistent grading results.

/// Full-mark scores paired with critical feedback.
pub mod contradiction;
/// Locating the JSON object inside a completion.
pub mod extract;
/// Rubric arithmetic.
pub mod normalize;
/// The grading protocol against a completion backend.
pub mod pipeline;
/// Grading prompt construction.
pub mod prompt;
/// Human-readable reports.
pub mod report;
/// Truncated JSON recovery.
pub mod repair;
/// Request, result and outcome types.
pub mod results;

pub use pipeline::GradingPipeline;
pub use results::{
    GradingOutcome, GradingReport, GradingResult, Leniency, ParseFailure, ParseOutcome,
    PipelineRequest, RubricCriterion, RubricInput, RubricItem,
};
