use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use autograde::{
    BackendError, BackendKind, ChatMessage, CompletionBackend, GradingOutcome, GradingPipeline,
    PipelineRequest, backend::Role,
};

const GOOD_REPLY: &str = r#"{"student_name": "Ada", "rubric_breakdown": {
    "Argument": {"score": 45, "max_points": 50, "feedback": "Persuasive."},
    "Evidence": {"score": 40, "max_points": 50, "feedback": "Well sourced."}
}, "strengths": ["Clear thesis"], "improvements": ["Tighten the ending"],
"overall_feedback": "Solid essay."}"#;

/// Backend that replays canned replies and records every call.
struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    calls:   AtomicUsize,
    seen:    Mutex<Vec<Vec<ChatMessage>>>,
    history: bool,
}

impl ScriptedBackend {
    fn new(history: bool, replies: Vec<Result<String, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            history,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        if self.history { BackendKind::ChatService } else { BackendKind::AgentProcess }
    }

    fn model_id(&self) -> &str {
        "scripted"
    }

    fn supports_history(&self) -> bool {
        self.history
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("still not json".to_string()))
    }
}

fn request() -> PipelineRequest {
    PipelineRequest::builder()
        .submission("An essay about rivers.")
        .student_name("Ada")
        .build()
}

#[tokio::test]
async fn first_reply_that_parses_needs_one_call() {
    let backend = ScriptedBackend::new(true, vec![Ok(format!("Sure!\n{GOOD_REPLY}\nCheers"))]);
    let pipeline = GradingPipeline::new(&backend);

    let outcome = pipeline.grade("grade it", &request()).await.unwrap();
    let result = outcome.result().expect("graded");
    assert_eq!(result.total_score, 85.0);
    assert_eq!(result.percentage, 85);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn retry_with_history_resends_the_conversation() {
    let backend = ScriptedBackend::new(
        true,
        vec![Ok("I think the essay deserves an 85.".into()), Ok(GOOD_REPLY.into())],
    );
    let pipeline = GradingPipeline::new(&backend);

    let outcome = pipeline.grade("grade it", &request()).await.unwrap();
    assert!(outcome.result().is_some());
    assert_eq!(backend.calls(), 2);

    let seen = backend.seen();
    let retry = &seen[1];
    assert_eq!(retry.len(), 3);
    assert_eq!(retry[0].role, Role::User);
    assert_eq!(retry[0].content, "grade it");
    assert_eq!(retry[1].role, Role::Assistant);
    assert_eq!(retry[1].content, "I think the essay deserves an 85.");
    assert_eq!(retry[2].role, Role::User);
    assert!(retry[2].content.contains("could not be parsed as JSON"));
    assert!(retry[2].content.contains("\"student_name\":\"Ada\""));
}

#[tokio::test]
async fn retry_without_history_quotes_the_first_reply() {
    let backend =
        ScriptedBackend::new(false, vec![Ok("no json here".into()), Ok(GOOD_REPLY.into())]);
    let pipeline = GradingPipeline::new(&backend);

    let outcome = pipeline.grade("grade it", &request()).await.unwrap();
    assert!(outcome.result().is_some());

    let seen = backend.seen();
    assert_eq!(seen[1].len(), 1);
    let prompt = &seen[1][0].content;
    assert!(prompt.contains("could not be parsed as JSON"));
    assert!(prompt.contains("<previous_response>\nno json here\n</previous_response>"));
}

#[tokio::test]
async fn failed_retry_reports_the_first_raw_reply() {
    let backend = ScriptedBackend::new(
        true,
        vec![Ok("first: not json".into()), Ok("second: still not json".into())],
    );
    let pipeline = GradingPipeline::new(&backend);

    let outcome = pipeline.grade("grade it", &request()).await.unwrap();
    let failure = outcome.failure().expect("parse failure");
    assert_eq!(failure.raw_response, "first: not json");
    assert!(!failure.parse_error.is_empty());
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn backend_errors_are_not_retried() {
    let backend = ScriptedBackend::new(true, vec![Err(BackendError::EmptyResponse)]);
    let pipeline = GradingPipeline::new(&backend);

    let err = pipeline.grade("grade it", &request()).await.unwrap_err();
    assert!(matches!(err, BackendError::EmptyResponse));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn backend_error_on_retry_propagates() {
    let backend = ScriptedBackend::new(
        true,
        vec![
            Ok("nope".into()),
            Err(BackendError::Request("connection reset".into())),
        ],
    );
    let pipeline = GradingPipeline::new(&backend);

    let err = pipeline.grade("grade it", &request()).await.unwrap_err();
    assert!(matches!(err, BackendError::Request(_)));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn never_more_than_two_calls() {
    // the scripted backend keeps answering garbage once the queue is empty
    let backend = ScriptedBackend::new(false, Vec::new());
    let pipeline = GradingPipeline::new(&backend);

    let outcome = pipeline.grade("grade it", &request()).await.unwrap();
    assert!(matches!(outcome, GradingOutcome::Failed(_)));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn truncated_reply_is_repaired_without_retry() {
    let truncated = r#"{"student_name": "Ada", "rubric_breakdown": {"Argument": {"score": 40, "max_points": 100, "feedback": "Reads well and"#;
    let backend = ScriptedBackend::new(true, vec![Ok(truncated.into())]);
    let pipeline = GradingPipeline::new(&backend);

    let outcome = pipeline.grade("grade it", &request()).await.unwrap();
    let result = outcome.result().expect("repaired");
    assert_eq!(result.total_score, 40.0);
    assert_eq!(result.rubric_breakdown["Argument"].feedback, "Reads well and");
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn grade_request_wraps_outcome_in_a_report() {
    let backend = ScriptedBackend::new(true, vec![Ok(GOOD_REPLY.into())]);
    let pipeline = GradingPipeline::new(&backend);

    let report = pipeline.grade_request(&request()).await.unwrap();
    assert_eq!(report.model_id, "scripted");
    let text = report.report_text.as_deref().expect("graded reports carry text");
    assert!(text.contains("Score: 85/100 (85%)"));

    let seen = backend.seen();
    assert!(seen[0][0].content.contains("<submission>\nAn essay about rivers.\n</submission>"));
}
