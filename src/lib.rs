//! # milisman
//!
//! Declarative GitHub label and milestone bootstrapper
//!
//! ## Features
//! - Configuration from a local file or an absolute URL
//! - Document validation before any API call
//! - Idempotent create-or-skip reconciliation
//! - GitHub Actions log groups and step summary

pub mod config;
pub mod error;
pub mod github;
pub mod report;
pub mod sync;

pub use config::{ConfigLoader, ConfigSource, DesiredState, LabelSpec, MilestoneSpec, RunSettings};
pub use error::{Error, Result};
pub use github::{CreateError, GitHubClient, IssueService};
pub use report::{ActionsReporter, MemoryReporter, Reporter};
pub use sync::{EntityOutcome, Outcome, ReconcileResult, Reconciler};

use tracing::info;

/// Run one reconciliation
///
/// Loads and validates the configuration, resolves the repository and
/// token, then creates every missing label and milestone.
///
/// # Examples
///
/// ```rust,no_run
/// use milisman::{MemoryReporter, RunSettings};
///
/// #[tokio::main]
/// async fn main() -> milisman::Result<()> {
///     let settings = RunSettings {
///         config_file: ".github/milisman.yaml".to_string(),
///         token: Some("your_github_token".to_string()),
///         repository: Some("owner/repo".to_string()),
///         ..Default::default()
///     };
///
///     let mut reporter = MemoryReporter::new();
///     let result = milisman::run(&settings, &mut reporter).await?;
///
///     println!("Created {}, skipped {}", result.created, result.skipped);
///     Ok(())
/// }
/// ```
///
/// # Errors
/// Returns an error for any pre-flight failure (configuration, context,
/// token, client setup). A failed create call is not an error here: it is
/// the last outcome of the returned result.
pub async fn run<R: Reporter + ?Sized>(
    settings: &RunSettings,
    reporter: &mut R,
) -> Result<ReconcileResult> {
    reporter.info("milisman starting");
    reporter.summary("# Milisman Report");

    let loader = match settings.timeout {
        Some(timeout) => ConfigLoader::with_timeout(timeout)?,
        None => ConfigLoader::new()?,
    };
    let state = loader.load(&settings.config_file, reporter).await?;

    let repo = settings.repo_context()?;
    let token = settings.token()?;

    info!(repository = %repo, api_url = settings.api_url(), "Reconciling repository");
    let client = GitHubClient::new(token, settings.api_url(), repo)?;
    let reconciler = Reconciler::new(client).with_timeout(settings.timeout);

    let result = reconciler.reconcile(&state, reporter).await;
    if result.is_success() {
        reporter.summary("Milisman finished.");
    }

    Ok(result)
}
