//! Console output with cargo test-like formatting.

use agent_test_core::{TestResult, TestStatus, TestSummary};
use comfy_table::{Cell, Color, Table};
use std::io::{self, Write};

/// Reporter configuration.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Show verbose output (messages, metrics and the results table).
    pub verbose: bool,
    /// Use colors in output.
    pub color: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            color: true,
        }
    }
}

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Test reporter with cargo test-like output.
#[derive(Debug, Clone)]
pub struct Reporter {
    config: ReporterConfig,
}

impl Reporter {
    #[must_use]
    pub const fn new(config: ReporterConfig) -> Self {
        Self { config }
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.config.color {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn status_label(&self, status: TestStatus) -> String {
        match status {
            TestStatus::Passed => self.paint("ok", GREEN),
            TestStatus::Failed => self.paint("FAILED", RED),
            TestStatus::Error => self.paint("ERROR", RED),
            TestStatus::Skipped => self.paint("ignored", YELLOW),
        }
    }

    /// Print the start of a run.
    pub fn run_start(&self, suite_name: &str, class_count: usize) {
        println!("Running {suite_name} ({class_count} classes)");
    }

    /// Print the start of a class.
    pub fn class_start(&self, class_name: &str, test_count: usize) {
        println!();
        println!("running {test_count} tests in {class_name}");
        self.flush();
    }

    /// Print a test result line.
    pub fn test_result(&self, result: &TestResult) {
        println!(
            "test {} ... {}",
            result.full_name(),
            self.status_label(result.status())
        );

        if self.config.verbose {
            if let Some(message) = result.message() {
                println!("     {message}");
            }
            if let Some(metrics) = result.metrics() {
                println!(
                    "     ({} tokens, ${:.4}, {:.2}s latency)",
                    metrics.tokens, metrics.cost, metrics.latency
                );
            }
        }
        self.flush();
    }

    /// Print the failures section.
    pub fn failures(&self, summary: &TestSummary) {
        let mut failures = summary.failures().peekable();
        if failures.peek().is_none() {
            return;
        }

        println!();
        println!("failures:");
        println!();
        for result in failures {
            println!("---- {} ({}) ----", result.full_name(), result.status());
            if let Some(message) = result.message() {
                println!("    {message}");
            }
            println!();
        }
    }

    /// Print the final summary line.
    pub fn summary(&self, summary: &TestSummary) {
        let status = if summary.is_success() {
            self.paint("ok", GREEN)
        } else {
            self.paint("FAILED", RED)
        };
        let counts = summary.counts();

        println!();
        println!(
            "test result: {status}. {} passed; {} failed; {} errors; {} ignored; \
             finished in {:.2}s",
            counts.passed,
            counts.failed,
            counts.errors,
            counts.skipped,
            summary.wall_duration().as_secs_f64()
        );
    }

    /// Print every result as a table (verbose mode only).
    pub fn results_table(&self, summary: &TestSummary) {
        if !self.config.verbose {
            return;
        }
        println!();
        println!("{}", build_results_table(summary));
    }

    /// Print a warning message.
    pub fn warn(&self, message: &str) {
        eprintln!("{}: {message}", self.paint("warning", YELLOW));
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        eprintln!("{}: {message}", self.paint("error", RED));
    }

    /// Flush stdout.
    pub fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

fn build_results_table(summary: &TestSummary) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Class", "Test", "Status", "Duration", "Tokens", "Cost",
    ]);

    for result in summary.results() {
        let status_cell = match result.status() {
            TestStatus::Passed => Cell::new("Passed").fg(Color::Green),
            TestStatus::Failed => Cell::new("Failed").fg(Color::Red),
            TestStatus::Error => Cell::new("Error").fg(Color::Red),
            TestStatus::Skipped => Cell::new("Skipped").fg(Color::Yellow),
        };
        let (tokens, cost) = result.metrics().map_or_else(
            || ("-".to_string(), "-".to_string()),
            |m| (m.tokens.to_string(), format!("${:.4}", m.cost)),
        );

        table.add_row(vec![
            Cell::new(result.class_name()),
            Cell::new(result.test_name()),
            status_cell,
            Cell::new(format!("{:.3}s", result.duration().as_secs_f64())),
            Cell::new(tokens),
            Cell::new(cost),
        ]);
    }
    table
}
