//! milisman CLI
//!
//! Creates the labels and milestones listed in a configuration document,
//! as a GitHub Actions step or from a terminal

use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use milisman::{
    sync::{EntityOutcome, Outcome, ReconcileResult},
    ActionsReporter, Reporter, RunSettings,
};

/// milisman CLI
///
/// Declarative GitHub label and milestone bootstrapper
#[derive(Parser, Debug)]
#[command(
    name = "milisman",
    version,
    about = "Create missing GitHub labels and milestones from a configuration file",
    long_about = "Reads a YAML (or JSON) document listing labels and milestones from a local \
    path or URL and creates each one in the target repository. Entities that already exist \
    are skipped, so re-running is safe."
)]
struct Cli {
    /// Configuration file path or absolute URL
    #[arg(short = 'c', long = "configfile", env = "INPUT_CONFIGFILE")]
    config_file: Option<String>,

    /// GitHub access token
    #[arg(short = 't', long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Target repository (owner/repo format)
    #[arg(short = 'r', long, env = "GITHUB_REPOSITORY")]
    repository: Option<String>,

    /// GitHub API base URL
    #[arg(long, env = "GITHUB_API_URL")]
    api_url: Option<String>,

    /// Timeout for each remote request, in seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_settings(self) -> RunSettings {
        RunSettings {
            config_file: self.config_file.unwrap_or_default(),
            token: self.token,
            repository: self.repository,
            api_url: self.api_url,
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut reporter = ActionsReporter::from_env();
    let settings = cli.into_settings();

    match milisman::run(&settings, &mut reporter).await {
        Ok(result) => {
            display_result(&result, &reporter);

            if let Some(failure) = result.failure() {
                let message = failure_message(failure);
                reporter.error(&message);
                eprintln!("\n{} {}", "✗".red(), message.red());
                std::process::exit(1);
            }
        }
        Err(e) => {
            reporter.error(&e.to_string());
            print_pending_summary(&reporter);
            eprintln!("\n{} {}", "✗".red(), e.to_string().red());
            if e.is_preflight() {
                eprintln!("  No labels or milestones were changed");
            }
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Initialize logging
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .without_time(),
        )
        .init();
}

/// Fatal message for the create call that halted the run
fn failure_message(failure: &EntityOutcome) -> String {
    match &failure.outcome {
        Outcome::Failed { error } => {
            format!("failed to create {} {}: {}", failure.kind, failure.key, error)
        }
        _ => format!("failed to create {} {}", failure.kind, failure.key),
    }
}

/// Print summary lines that did not go to a step summary file
fn print_pending_summary(reporter: &ActionsReporter) {
    for line in reporter.pending_summary() {
        if line.starts_with('#') {
            println!("{}", line.bold());
        } else if line.ends_with(" Created") {
            println!("  {}", line.green());
        } else if line.ends_with(" Skipped") {
            println!("  {}", line.yellow());
        } else if line.ends_with(" Failed") {
            println!("  {}", line.red());
        } else {
            println!("{line}");
        }
    }
}

/// Display reconciliation results
fn display_result(result: &ReconcileResult, reporter: &ActionsReporter) {
    print_pending_summary(reporter);

    if result.is_success() && result.has_changes() {
        println!("\n{} Reconciliation completed:", "✓".green());
    } else if result.is_success() {
        println!("\n{} No changes required", "✓".green());
    } else {
        println!("\n{} Reconciliation halted:", "!".yellow());
    }

    println!("  Created: {}", result.created.to_string().green());
    println!("  Skipped: {}", result.skipped.to_string().yellow());
}
