//! Run Reporting
//!
//! Renders run progress as log lines, GitHub workflow commands and a
//! step summary

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Environment variable naming the step summary file on GitHub Actions
pub const STEP_SUMMARY_ENV: &str = "GITHUB_STEP_SUMMARY";

/// Receiver of run progress
///
/// Handed explicitly to the loader and the reconciler.
pub trait Reporter {
    /// Informational log line
    fn info(&mut self, message: &str);

    /// Start a collapsible log group
    fn group(&mut self, title: &str);

    /// Close the current log group
    fn end_group(&mut self);

    /// Append one line to the run summary
    fn summary(&mut self, line: &str);

    /// Surface a fatal error to the invoking environment
    fn error(&mut self, message: &str);
}

/// GitHub Actions Reporter
///
/// Writes workflow commands to stdout and appends summary lines to the
/// step summary file. Without a summary file the lines are kept so the
/// caller can print them.
#[derive(Debug, Default)]
pub struct ActionsReporter {
    summary_file: Option<PathBuf>,
    pending: Vec<String>,
}

impl ActionsReporter {
    /// Create a reporter from the `GITHUB_STEP_SUMMARY` environment variable
    pub fn from_env() -> Self {
        let summary_file = std::env::var_os(STEP_SUMMARY_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        Self {
            summary_file,
            pending: Vec::new(),
        }
    }

    /// Create a reporter that appends to the given summary file
    pub fn with_summary_file<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            summary_file: Some(path.into()),
            pending: Vec::new(),
        }
    }

    /// Summary lines not written to a step summary file
    pub fn pending_summary(&self) -> &[String] {
        &self.pending
    }

    /// Whether summary lines go to a step summary file
    pub fn writes_step_summary(&self) -> bool {
        self.summary_file.is_some()
    }
}

impl Reporter for ActionsReporter {
    fn info(&mut self, message: &str) {
        info!("{message}");
    }

    fn group(&mut self, title: &str) {
        println!("::group::{title}");
    }

    fn end_group(&mut self) {
        println!("::endgroup::");
    }

    fn summary(&mut self, line: &str) {
        match &self.summary_file {
            Some(path) => {
                if let Err(e) = append_line(path, line) {
                    warn!(path = %path.display(), error = %e, "Failed to write step summary");
                }
            }
            None => self.pending.push(line.to_string()),
        }
    }

    fn error(&mut self, message: &str) {
        println!("::error::{}", escape_command_data(message));
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

/// Escape a workflow command message so it stays on one line
fn escape_command_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Recorded reporter event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Info(String),
    Group(String),
    EndGroup,
    Summary(String),
    Error(String),
}

/// In-memory Reporter
///
/// Records every event, for tests and for callers that render output themselves
#[derive(Debug, Default, Clone)]
pub struct MemoryReporter {
    pub events: Vec<ReportEvent>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary lines in the order they were reported
    pub fn summary_lines(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ReportEvent::Summary(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Info lines in the order they were reported
    pub fn info_lines(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ReportEvent::Info(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn info(&mut self, message: &str) {
        self.events.push(ReportEvent::Info(message.to_string()));
    }

    fn group(&mut self, title: &str) {
        self.events.push(ReportEvent::Group(title.to_string()));
    }

    fn end_group(&mut self) {
        self.events.push(ReportEvent::EndGroup);
    }

    fn summary(&mut self, line: &str) {
        self.events.push(ReportEvent::Summary(line.to_string()));
    }

    fn error(&mut self, message: &str) {
        self.events.push(ReportEvent::Error(message.to_string()));
    }
}
