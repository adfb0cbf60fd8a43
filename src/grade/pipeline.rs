#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Sends a grading prompt to a completion backend and turns the reply into a
//! [`GradingOutcome`].
//!
//! The protocol is two calls at most: one attempt, and one corrective retry
//! if the first reply cannot be parsed. Backend errors end the run
//! immediately and are never retried here.

use serde_json::json;
use tracing::Instrument;
use uuid::Uuid;

use super::{
    PipelineRequest,
    extract::extract_json_candidate,
    normalize::{ANONYMOUS, normalize_result, number_value},
    prompt::build_grading_prompt,
    repair::parse_candidate,
    results::{GradingOutcome, GradingReport, GradingResult, ParseFailure, ParseOutcome},
};
use crate::{
    backend::{ChatMessage, CompletionBackend},
    error::BackendError,
};

/// Longest slice of a failed reply echoed back in an isolated retry prompt.
const ISOLATED_RETRY_ECHO_CHARS: usize = 8_000;

/// Which of the two possible backend calls is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// The caller's prompt.
    First,
    /// The corrective prompt after an unparseable first reply.
    Retry,
}

/// Runs grading requests against a borrowed completion backend.
///
/// The pipeline holds no state between calls, so one instance can serve
/// concurrent requests.
pub struct GradingPipeline<'a, B: CompletionBackend + ?Sized> {
    /// Backend owned by the caller.
    backend: &'a B,
}

impl<'a, B: CompletionBackend + ?Sized> GradingPipeline<'a, B> {
    /// Creates a pipeline over `backend`.
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Builds the prompt for `request`, grades it, and wraps the outcome with
    /// the model identifier, timestamp and text report.
    pub async fn grade_request(
        &self,
        request: &PipelineRequest,
    ) -> Result<GradingReport, BackendError> {
        let prompt = build_grading_prompt(request);
        let outcome = self.grade(&prompt, request).await?;
        Ok(GradingReport::new(outcome, self.backend.model_id()))
    }

    /// Grades with a caller-supplied prompt.
    ///
    /// `request` only contributes `max_score` and `student_name`, which the
    /// normalizer needs; the prompt is sent as-is.
    pub async fn grade(
        &self,
        prompt: &str,
        request: &PipelineRequest,
    ) -> Result<GradingOutcome, BackendError> {
        let span = tracing::info_span!(
            "grading",
            invocation = %Uuid::new_v4(),
            backend = %self.backend.kind(),
            model = %self.backend.model_id(),
        );
        self.run(prompt, request).instrument(span).await
    }

    /// Sequences the first attempt and the optional retry.
    async fn run(
        &self,
        prompt: &str,
        request: &PipelineRequest,
    ) -> Result<GradingOutcome, BackendError> {
        let first_raw = self
            .call(Attempt::First, &[ChatMessage::user(prompt)])
            .await?;

        let first_error = match finalize(&first_raw, request) {
            Ok(result) => return Ok(GradingOutcome::Graded(result)),
            Err(message) => message,
        };
        tracing::warn!(error = %first_error, "First completion could not be parsed; retrying once");

        let corrective = corrective_prompt(request);
        let messages = if self.backend.supports_history() {
            vec![
                ChatMessage::user(prompt),
                ChatMessage::assistant(first_raw.clone()),
                ChatMessage::user(corrective),
            ]
        } else {
            vec![ChatMessage::user(isolated_retry_prompt(&corrective, &first_raw))]
        };

        let retry_raw = self.call(Attempt::Retry, &messages).await?;
        match finalize(&retry_raw, request) {
            Ok(result) => {
                tracing::info!("Retry produced a usable result");
                Ok(GradingOutcome::Graded(result))
            }
            Err(parse_error) => {
                tracing::warn!(error = %parse_error, "Retry could not be parsed either");
                Ok(GradingOutcome::Failed(ParseFailure {
                    raw_response: first_raw,
                    parse_error,
                }))
            }
        }
    }

    /// Issues one backend call.
    async fn call(
        &self,
        attempt: Attempt,
        messages: &[ChatMessage],
    ) -> Result<String, BackendError> {
        tracing::info!(?attempt, messages = messages.len(), "Requesting completion");
        let raw = self.backend.complete(messages).await?;
        tracing::debug!(?attempt, chars = raw.len(), "Completion received");
        Ok(raw)
    }
}

/// Extracts, repairs and normalizes one completion.
///
/// Returns the parse error message when no JSON object can be recovered.
pub fn finalize(raw: &str, request: &PipelineRequest) -> Result<GradingResult, String> {
    let candidate = extract_json_candidate(raw);
    match parse_candidate(&candidate, raw) {
        ParseOutcome::Parsed(mut value) => {
            normalize_result(&mut value, request.max_score, &request.student_name);
            Ok(GradingResult::from_value(&value))
        }
        ParseOutcome::Failed { message, .. } => Err(message),
    }
}

/// Compact follow-up asking for nothing but the JSON object.
///
/// The full grading instructions are not repeated; only a schema skeleton
/// echoing the student name and maximum score.
pub fn corrective_prompt(request: &PipelineRequest) -> String {
    let student_name = match request.student_name.trim() {
        "" => ANONYMOUS,
        name => name,
    };
    let skeleton = json!({
        "student_name": student_name,
        "total_score": 0,
        "max_score": number_value(request.max_score),
        "percentage": 0,
        "rubric_breakdown": {
            "<criterion name>": {"score": 0, "max_points": 0, "feedback": "<one sentence>"}
        },
        "strengths": ["<strength>"],
        "improvements": ["<improvement>"],
        "overall_feedback": "<two or three sentences>"
    });

    format!(
        "Your previous response could not be parsed as JSON. Reply with only one JSON object, \
         with no commentary and no code fences, using exactly this structure:\n{skeleton}\n\
         Keep every feedback string short so the response is not cut off."
    )
}

/// Corrective prompt for backends without conversation history: the failed
/// reply is quoted so the backend can restructure it.
fn isolated_retry_prompt(corrective: &str, first_raw: &str) -> String {
    let echoed: String = first_raw.chars().take(ISOLATED_RETRY_ECHO_CHARS).collect();
    format!(
        "{corrective}\n\nYour previous response was:\n<previous_response>\n{echoed}\n\
         </previous_response>"
    )
}
