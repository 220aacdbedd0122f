//! agent-test CLI - Test runner for AI agents against mocked LLM responses.

mod report;
mod reporter;

use agent_test_core::{
    ConfigOverrides, DiscoveryError, ProgressEvent, RunnerConfig, RunnerError, Scope,
    TestRunner, TestSummary,
};
use clap::Parser;
use report::{ExecutionReport, ReportFormat, format_report_json};
use reporter::{Reporter, ReporterConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt};

/// Exit codes for the CLI.
mod exit_code {
    pub const SUCCESS: u8 = 0;
    pub const TESTS_FAILED: u8 = 1;
    pub const CONFIG_ERROR: u8 = 2;
    pub const EXECUTION_ERROR: u8 = 3;
}

#[derive(Parser)]
#[command(name = "agent-test")]
#[command(about = "Test runner for AI agents with mocked LLM responses")]
#[command(version)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Directory or suite file to test
    #[arg(value_name = "SCOPE", default_value = ".")]
    scope: PathBuf,

    /// Output format: console, json
    #[arg(long, default_value = "console")]
    format: String,

    /// Filter tests by `Class::test` (substring match)
    #[arg(long)]
    filter: Option<String>,

    /// Only run tests carrying this tag (repeatable, all must match)
    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,

    /// Suite name (overrides config)
    #[arg(long)]
    suite_name: Option<String>,

    /// Case-sensitive text assertions (overrides config)
    #[arg(long)]
    case_sensitive: bool,

    /// Similarity threshold in [0, 1] (overrides config)
    #[arg(long)]
    similarity_threshold: Option<f64>,

    /// Grounding threshold in [0, 1] (overrides config)
    #[arg(long)]
    grounding_threshold: Option<f64>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

impl Cli {
    fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            filter: self.filter.clone(),
            tags: self.tags.clone(),
            overrides: ConfigOverrides {
                suite_name: self.suite_name.clone(),
                case_sensitive: self.case_sensitive.then_some(true),
                similarity_threshold: self.similarity_threshold,
                grounding_threshold: self.grounding_threshold,
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run_command(cli).await
}

/// Exit code for an error that stopped the run before any result.
const fn error_exit_code(err: &RunnerError) -> u8 {
    match err {
        RunnerError::Config(_) | RunnerError::Discovery(DiscoveryError::Config(_)) => {
            exit_code::CONFIG_ERROR
        }
        _ => exit_code::EXECUTION_ERROR,
    }
}

fn run_scope(runner: &TestRunner, scope: PathBuf) -> Result<TestSummary, RunnerError> {
    if scope.is_file() {
        runner.run_file(&scope)
    } else {
        runner.run_all(&Scope::Path(scope))
    }
}

async fn run_command(cli: Cli) -> ExitCode {
    let reporter = Reporter::new(ReporterConfig {
        verbose: cli.verbose,
        color: !cli.no_color,
    });

    let report_format: ReportFormat = match cli.format.parse() {
        Ok(f) => f,
        Err(e) => {
            reporter.error(&format!("Invalid format: {e}"));
            return ExitCode::from(exit_code::CONFIG_ERROR);
        }
    };

    let show_progress = report_format == ReportFormat::Console;
    tracing::debug!(scope = %cli.scope.display(), format = ?report_format, "starting run");

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let printer = reporter.clone();
    let progress_handle = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            if !show_progress {
                continue;
            }
            match event {
                ProgressEvent::RunStarted {
                    suite_name,
                    class_count,
                } => printer.run_start(&suite_name, class_count),
                ProgressEvent::ClassStarted {
                    class_name,
                    test_count,
                } => printer.class_start(&class_name, test_count),
                ProgressEvent::TestCompleted { result } => printer.test_result(&result),
                ProgressEvent::ClassCompleted { .. } => {}
            }
        }
    });

    // The runner is synchronous; keep it off the async workers
    let runner = TestRunner::new(cli.runner_config()).with_progress(progress_tx);
    let scope = cli.scope.clone();
    let outcome = tokio::task::spawn_blocking(move || run_scope(&runner, scope)).await;
    let _ = progress_handle.await;

    let summary = match outcome {
        Ok(Ok(summary)) => summary,
        Ok(Err(e)) => {
            reporter.error(&format!("Test execution failed: {e}"));
            return ExitCode::from(error_exit_code(&e));
        }
        Err(e) => {
            reporter.error(&format!("Test execution failed: {e}"));
            return ExitCode::from(exit_code::EXECUTION_ERROR);
        }
    };

    if summary.results().is_empty() {
        if let Some(filter) = &cli.filter {
            reporter.warn(&format!("No tests match filter '{filter}'"));
        } else {
            reporter.warn(&format!("No tests found in {}", cli.scope.display()));
        }
        return ExitCode::from(exit_code::SUCCESS);
    }

    match report_format {
        ReportFormat::Json => {
            println!("{}", format_report_json(&ExecutionReport::new(&summary)));
        }
        ReportFormat::Console => {
            reporter.failures(&summary);
            reporter.summary(&summary);
            reporter.results_table(&summary);
        }
    }

    if summary.is_success() {
        ExitCode::from(exit_code::SUCCESS)
    } else {
        ExitCode::from(exit_code::TESTS_FAILED)
    }
}
