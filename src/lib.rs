//! # autograde
//!
//! Grades free-text submissions by sending a prompt to a completion backend
//! and turning its reply into a structured, numerically consistent score
//! report.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Completion backends (chat service and agent process)
pub mod backend;
/// Environment-driven configuration
pub mod config;
/// Error types shared across backends
pub mod error;
/// For all things related to grading
pub mod grade;
/// Subprocess helpers used by the agent backend
pub mod process;

pub use backend::{BackendKind, ChatMessage, CompletionBackend};
pub use error::BackendError;
pub use grade::{
    GradingOutcome, GradingPipeline, GradingReport, GradingResult, Leniency, ParseFailure,
    PipelineRequest, RubricCriterion, RubricInput,
};
