use std::env;
use std::path::PathBuf;
use std::process::{Command, ExitCode};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

/// Suites run by `xtask agent-test` when no arguments are given.
const DEFAULT_SUITES: &str = "crates/agent-test/tests/fixtures/passing";

#[derive(Parser)]
#[command(name = "xtask", about = "Build tasks for agent-test")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run cargo fmt --check
    Fmt,
    /// Run cargo check
    Check,
    /// Run cargo clippy
    Clippy,
    /// Run cargo test
    Test,
    /// Run all CI checks (fmt, check, clippy, test, agent-test)
    Ci,
    /// Run agent-test against the bundled suites
    AgentTest {
        /// Arguments to pass to agent-test
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Build release and install to ~/.agent-test/bin/
    Install,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Fmt => cmd_fmt(),
        Commands::Check => cmd_check(),
        Commands::Clippy => cmd_clippy(),
        Commands::Test => cmd_test(),
        Commands::Ci => cmd_ci(),
        Commands::AgentTest { args } => cmd_agent_test(&args),
        Commands::Install => cmd_install(),
    }
}

fn cmd_fmt() -> Result<()> {
    cargo(&["fmt", "--all", "--check"])
}

fn cmd_check() -> Result<()> {
    cargo(&["check", "--workspace", "--all-targets"])
}

fn cmd_clippy() -> Result<()> {
    cargo(&["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])
}

fn cmd_test() -> Result<()> {
    cargo(&["test", "--workspace"])
}

fn cmd_ci() -> Result<()> {
    cmd_fmt()?;
    cmd_check()?;
    cmd_clippy()?;
    cmd_test()?;
    cmd_agent_test(&[])?;
    Ok(())
}

fn cmd_agent_test(args: &[String]) -> Result<()> {
    let mut cmd_args = vec!["run", "-p", "agent-test", "--release", "--"];
    if args.is_empty() {
        cmd_args.extend([DEFAULT_SUITES, "--verbose"]);
    } else {
        cmd_args.extend(args.iter().map(String::as_str));
    }
    cargo(&cmd_args)
}

fn cmd_install() -> Result<()> {
    cargo(&["build", "--release", "-p", "agent-test"])?;

    let home = env::var_os("HOME").context("HOME environment variable not set")?;
    let bin_dir = PathBuf::from(home).join(".agent-test/bin");

    std::fs::create_dir_all(&bin_dir)
        .with_context(|| format!("Failed to create directory: {}", bin_dir.display()))?;

    let src = PathBuf::from("target/release/agent-test");
    let dst = bin_dir.join("agent-test");
    std::fs::copy(&src, &dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    println!("Installed: {}", dst.display());

    println!();
    println!("Add to shell profile:");
    println!("  export PATH={}:$PATH", bin_dir.display());

    Ok(())
}

fn cargo(args: &[&str]) -> Result<()> {
    exec("cargo", args)
}

fn exec(program: &str, args: &[&str]) -> Result<()> {
    let cmd_line = format!("{program} {}", args.join(" "));
    eprintln!("$ {cmd_line}");

    let status = Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("Failed to execute: {cmd_line}"))?;

    if !status.success() {
        let code_info = match status.code() {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        bail!("{cmd_line}: {code_info}");
    }
    Ok(())
}
