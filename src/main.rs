#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # autograde
//!
//! Grades free-text submissions with a chat model or a command-line agent and
//! prints a consistent score report.
//!
//! Credentials and defaults come from the environment (a `.env` file is read
//! when present): `OPENAI_API_KEY`, `AUTOGRADE_MODEL`, `AUTOGRADE_BACKEND`,
//! `AUTOGRADE_AGENT_COMMAND`, and friends. `AUTOGRADE_LOG` sets the log
//! level.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use autograde::{
    BackendKind, GradingOutcome, GradingPipeline, GradingReport, Leniency, PipelineRequest,
    RubricInput, backend, config::GraderConfig, grade::pipeline::finalize,
};
use bpaf::*;
use dotenvy::dotenv;
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Arguments for grading submissions with a backend.
#[derive(Debug, Clone)]
struct GradeArgs {
    /// Submission files, graded one after another.
    submissions:  Vec<PathBuf>,
    /// Assignment instructions file.
    instructions: Option<PathBuf>,
    /// Rubric file (JSON or free text).
    rubric:       Option<PathBuf>,
    /// Extra note for the grader.
    note:         Option<String>,
    /// Score the rubric is scaled to.
    max_score:    f64,
    /// Student name.
    student:      Option<String>,
    /// Grading strictness.
    leniency:     Leniency,
    /// Backend override.
    backend:      Option<BackendKind>,
    /// Model override.
    model:        Option<String>,
    /// Print the JSON envelope instead of the text report.
    json:         bool,
}

/// Arguments for re-running the parsing stages on a saved completion.
#[derive(Debug, Clone)]
struct ReparseArgs {
    /// File holding a raw completion.
    file:      PathBuf,
    /// Score the rubric is scaled to.
    max_score: f64,
    /// Student name.
    student:   Option<String>,
    /// Print JSON instead of the text report.
    json:      bool,
}

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Grade submissions with a completion backend
    Grade(GradeArgs),
    /// Parse and normalize a saved completion without calling a backend
    Reparse(ReparseArgs),
}

/// Parses the maximum score
fn max_score_arg() -> impl Parser<f64> {
    long("max-score")
        .help("Score the rubric is scaled to")
        .argument::<f64>("POINTS")
        .guard(|points| valid_max_score(*points), "max score must be a positive number")
        .fallback(100.0)
}

/// Parses the student name
fn student_arg() -> impl Parser<Option<String>> {
    long("student")
        .help("Student name used when the grader omits one")
        .argument::<String>("NAME")
        .optional()
}

/// Parses the json switch
fn json_arg() -> impl Parser<bool> {
    long("json")
        .help("Print JSON instead of the text report")
        .switch()
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    let submissions = long("submission")
        .short('s')
        .help("Plain-text submission file; repeat to grade several")
        .argument::<PathBuf>("FILE")
        .some("at least one --submission is required");
    let instructions = long("instructions")
        .short('i')
        .help("Assignment instructions file")
        .argument::<PathBuf>("FILE")
        .optional();
    let rubric = long("rubric")
        .short('r')
        .help("Rubric file: a JSON object of criterion points, or free text")
        .argument::<PathBuf>("FILE")
        .optional();
    let note = long("note")
        .help("Extra note for the grader")
        .argument::<String>("TEXT")
        .optional();
    let max_score = max_score_arg();
    let student = student_arg();
    let leniency = long("leniency")
        .help("strict, normal, lenient or very_lenient")
        .argument::<Leniency>("LEVEL")
        .fallback(Leniency::Normal);
    let backend = long("backend")
        .help("chat or agent (defaults to AUTOGRADE_BACKEND, then chat)")
        .argument::<BackendKind>("KIND")
        .optional();
    let model = long("model")
        .help("Model identifier override")
        .argument::<String>("ID")
        .optional();
    let json = json_arg();

    let grade = construct!(GradeArgs {
        submissions,
        instructions,
        rubric,
        note,
        max_score,
        student,
        leniency,
        backend,
        model,
        json
    })
    .to_options()
    .command("grade")
    .help("Grade submissions with a completion backend")
    .map(Cmd::Grade);

    let file = positional::<PathBuf>("FILE").help("File holding a raw completion");
    let max_score = max_score_arg();
    let student = student_arg();
    let json = json_arg();
    let reparse = construct!(ReparseArgs {
        file,
        max_score,
        student,
        json
    })
    .to_options()
    .command("reparse")
    .help("Parse and normalize a saved completion without calling a backend")
    .map(Cmd::Reparse);

    let cmd = construct!([grade, reparse]);

    cmd.to_options()
        .descr("Grades free-text submissions with a language model")
        .run()
}

/// Whether a maximum score can be used as a rescale target.
fn valid_max_score(points: f64) -> bool {
    points.is_finite() && points > 0.0
}

/// Reads a text file with a helpful error.
fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))
}

/// Prints a grading report as text or JSON.
fn print_report(report: &GradingReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    match &report.outcome {
        GradingOutcome::Graded(_) => {
            println!("{}", report.report_text.as_deref().unwrap_or_default());
        }
        GradingOutcome::Failed(failure) => {
            println!("Grading failed: {}\n", failure.parse_error);
            println!("Raw response from {}:\n{}", report.model_id, failure.raw_response);
        }
    }
    Ok(())
}

/// Grades every submission with one backend, one pipeline run each.
async fn grade(args: GradeArgs) -> Result<()> {
    let config = GraderConfig::from_env();
    let kind = args.backend.unwrap_or_else(|| config.default_backend());
    let backend = backend::from_config(kind, &config, args.model.clone())
        .context("Could not set up the completion backend")?;
    let pipeline = GradingPipeline::new(backend.as_ref());

    let instructions = args
        .instructions
        .as_deref()
        .map(read_text)
        .transpose()?
        .unwrap_or_default();
    let rubric = args
        .rubric
        .as_deref()
        .map(read_text)
        .transpose()?
        .map(|text| RubricInput::from_text(&text));

    for path in &args.submissions {
        let request = PipelineRequest::builder()
            .maybe_rubric(rubric.clone())
            .instructions(instructions.clone())
            .submission(read_text(path)?)
            .maybe_note(args.note.clone())
            .max_score(args.max_score)
            .student_name(args.student.clone().unwrap_or_default())
            .leniency(args.leniency)
            .build();

        tracing::info!("Grading {}", path.display());
        let report = pipeline
            .grade_request(&request)
            .await
            .with_context(|| format!("Completion backend failed for {}", path.display()))?;
        print_report(&report, args.json)?;
    }

    Ok(())
}

/// Runs extraction, repair and normalization on a saved completion.
fn reparse(args: ReparseArgs) -> Result<()> {
    let raw = read_text(&args.file)?;
    let request = PipelineRequest::builder()
        .submission(String::new())
        .max_score(args.max_score)
        .student_name(args.student.unwrap_or_default())
        .build();

    let outcome = match finalize(&raw, &request) {
        Ok(result) => GradingOutcome::Graded(result),
        Err(parse_error) => GradingOutcome::Failed(autograde::ParseFailure {
            raw_response: raw,
            parse_error,
        }),
    };
    print_report(&GradingReport::new(outcome, "reparse"), args.json)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let level = std::env::var("AUTOGRADE_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    let fmt = fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(level);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    match options() {
        Cmd::Grade(args) => grade(args).await,
        Cmd::Reparse(args) => reparse(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_score_must_be_positive_and_finite() {
        assert!(valid_max_score(100.0));
        assert!(valid_max_score(12.5));
        assert!(!valid_max_score(0.0));
        assert!(!valid_max_score(-10.0));
        assert!(!valid_max_score(f64::NAN));
        assert!(!valid_max_score(f64::INFINITY));
    }

    #[test]
    fn max_score_flag_rejects_nan_and_negatives() {
        let parser = max_score_arg().to_options();

        let parsed = parser.run_inner(&["--max-score", "50"][..]);
        assert_eq!(parsed.ok(), Some(50.0));
        assert_eq!(parser.run_inner(&[] as &[&str]).ok(), Some(100.0));
        assert!(parser.run_inner(&["--max-score", "NaN"][..]).is_err());
        assert!(parser.run_inner(&["--max-score", "-5"][..]).is_err());
    }
}
