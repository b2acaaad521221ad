//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use thiserror::Error;

use unpackr::core::config::Config;
use unpackr::core::errors::UnpackrError;
use unpackr::orchestrator::{self, RunOptions, RunSummary};
use unpackr::runner::cancel::{CANCEL_EXIT_CODE, CancelToken};

/// unpackr — unattended post-download cleanup for Usenet-style directories.
#[derive(Debug, Parser)]
#[command(
    name = "unpackr",
    author,
    version,
    about = "Validate, extract, and tidy post-download release folders",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path (JSON).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Process a source tree into a destination tree.
    Run(RunArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
#[allow(clippy::struct_excessive_bools)]
struct RunArgs {
    /// Source tree containing downloaded release folders.
    #[arg(value_name = "SOURCE")]
    source: PathBuf,
    /// Destination tree for validated videos.
    #[arg(value_name = "DEST")]
    destination: PathBuf,
    /// Preview only: decide everything, mutate nothing.
    #[arg(long, visible_alias = "preview")]
    dry_run: bool,
    /// Print the pre-flight plan and exit.
    #[arg(long)]
    plan: bool,
    /// Verify the audit trail against the destination after the run.
    #[arg(long)]
    audit: bool,
    /// Write the JSONL audit stream to this file (stderr otherwise).
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,
    /// Plain presentation: no progress decoration.
    #[arg(long)]
    plain: bool,
    /// Record raw paths in audit records instead of opaque ids.
    #[arg(long)]
    no_privacy: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: CompletionShell,
}

/// CLI-level failures with their process exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Unpackr(#[from] UnpackrError),
    #[error("{0}")]
    Output(#[from] io::Error),
}

impl CliError {
    /// 1 runtime failure, 3 missing external tool, 130 cancelled.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unpackr(UnpackrError::MissingTool { .. }) => 3,
            Self::Unpackr(UnpackrError::Cancelled) => CANCEL_EXIT_CODE,
            _ => 1,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Unpackr(value.into())
    }
}

/// Dispatch a parsed CLI invocation; returns the process exit code.
pub fn run(cli: &Cli) -> Result<i32, CliError> {
    match &cli.command {
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "unpackr", &mut io::stdout());
            Ok(0)
        }
        Command::Run(args) => run_pipeline(cli, args),
    }
}

fn run_pipeline(cli: &Cli, args: &RunArgs) -> Result<i32, CliError> {
    let config = Config::load(cli.config.as_deref())?;

    let colored_out = !cli.no_color && config.color && io::stdout().is_terminal();
    if !colored_out {
        control::set_override(false);
    }

    let cancel = CancelToken::new();
    cancel.install_signal_hooks();

    let options = RunOptions {
        source: args.source.clone(),
        destination: args.destination.clone(),
        dry_run: args.dry_run,
        plan_only: args.plan,
        audit: args.audit,
        log_file: args.log.clone(),
        no_privacy: args.no_privacy,
    };

    let summary = orchestrator::run(&config, &options, &cancel)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !cli.quiet {
        let plain = args.plain || !config.animations;
        print_summary(&summary, plain);
    }
    Ok(summary.exit_code())
}

fn print_summary(summary: &RunSummary, plain: bool) {
    if summary.plan_only {
        println!("{}", "pre-flight plan".bold());
        for folder in &summary.folders {
            println!("  {}  {}", folder.folder.dimmed(), folder.class);
        }
        println!("{} folder(s) scanned", summary.folders.len());
        return;
    }

    let heading = if summary.dry_run {
        "run summary (dry-run)".bold().yellow()
    } else {
        "run summary".bold()
    };
    println!("{heading}");

    for folder in &summary.folders {
        let disposition = folder.disposition.as_deref().unwrap_or("-");
        let line = format!(
            "  {}  {:<16} {}",
            folder.folder.dimmed(),
            folder.class.to_string(),
            disposition
        );
        if plain {
            println!("{line}");
        } else {
            match disposition {
                "deleted" => println!("{}", line.green()),
                "errored" => println!("{}", line.red()),
                "cancelled" => println!("{}", line.yellow()),
                _ => println!("{line}"),
            }
        }
        for failure in &folder.soft_failures {
            println!("      {} {failure}", "!".red());
        }
    }

    let s = &summary.stats;
    println!(
        "videos: {} found, {} moved, {} rejected; archives: {} extracted, {} failed",
        s.videos_found, s.videos_moved, s.videos_rejected, s.archives_extracted, s.archives_failed
    );
    println!(
        "folders: {} cleaned, {} preserved, {} skipped, {} errored; junk removed: {}",
        s.folders_cleaned, s.folders_preserved, s.folders_skipped, s.folders_errored, s.junk_removed
    );
    if !s.refusals.is_empty() {
        let rendered: Vec<String> = s
            .refusals
            .iter()
            .map(|(inv, n)| format!("{inv}×{n}"))
            .collect();
        println!("{} {}", "refused operations:".red(), rendered.join(", "));
    }
    if !summary.undeletable_folders.is_empty() {
        println!(
            "{} {} folder(s) could not be deleted after retries",
            "warning:".yellow(),
            summary.undeletable_folders.len()
        );
    }
    for finding in &summary.audit_findings {
        println!("{} {finding}", "audit:".red());
    }
    if summary.cancelled {
        println!("{}", "run cancelled before completion".yellow());
    }
}
