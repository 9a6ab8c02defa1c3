//! Label and Milestone Reconciliation
//!
//! Creates the labels and milestones of a desired state, treating ones
//! that already exist as done

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::DesiredState;
use crate::error::Error;
use crate::github::{CreateError, CreatedEntity, IssueService};
use crate::report::Reporter;

/// Kind of entity being reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Label,
    Milestone,
}

impl EntityKind {
    /// Log group and summary section title
    pub fn section_title(&self) -> &'static str {
        match self {
            EntityKind::Label => "Labels",
            EntityKind::Milestone => "Milestones",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Label => f.write_str("label"),
            EntityKind::Milestone => f.write_str("milestone"),
        }
    }
}

/// Why an entity was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyExists,
}

/// Result of one reconciliation attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The entity was created
    Created,

    /// Nothing to do
    Skipped { reason: SkipReason },

    /// The create call failed; reconciliation stops here
    Failed { error: String },
}

impl Outcome {
    fn summary_word(&self) -> &'static str {
        match self {
            Outcome::Created => "Created",
            Outcome::Skipped { .. } => "Skipped",
            Outcome::Failed { .. } => "Failed",
        }
    }
}

/// Outcome for a single label or milestone
#[derive(Debug, Clone, PartialEq)]
pub struct EntityOutcome {
    pub kind: EntityKind,

    /// Identity key (label name or milestone title)
    pub key: String,

    pub outcome: Outcome,
}

impl EntityOutcome {
    /// Whether this attempt stopped the run
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }
}

/// Reconciliation result
#[derive(Debug, Clone, Default)]
pub struct ReconcileResult {
    /// Outcomes in processing order; a failure, if any, is last
    pub outcomes: Vec<EntityOutcome>,

    /// Number of entities created
    pub created: u32,

    /// Number of entities skipped
    pub skipped: u32,
}

impl ReconcileResult {
    /// Create a new empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an outcome and update statistics
    pub fn add_outcome(&mut self, outcome: EntityOutcome) {
        match outcome.outcome {
            Outcome::Created => self.created += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Failed { .. } => {}
        }
        self.outcomes.push(outcome);
    }

    /// The failed attempt that halted reconciliation
    pub fn failure(&self) -> Option<&EntityOutcome> {
        self.outcomes.iter().find(|outcome| outcome.is_failure())
    }

    /// Whether every entity was created or skipped
    pub fn is_success(&self) -> bool {
        self.failure().is_none()
    }

    /// Whether anything was created
    pub fn has_changes(&self) -> bool {
        self.created > 0
    }
}

/// Reconciliation Engine
///
/// Walks labels then milestones in order, issuing one create call per
/// entity. "Already exists" is a skip; any other failure halts the run.
pub struct Reconciler<S> {
    service: S,
    timeout: Option<Duration>,
}

impl<S: IssueService> Reconciler<S> {
    /// Create a new reconciler on top of an issue service
    pub fn new(service: S) -> Self {
        Self {
            service,
            timeout: None,
        }
    }

    /// Bound every create call; an elapsed timeout is a failure
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Underlying issue service
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Reconcile a desired state
    ///
    /// # Arguments
    /// - `state`: Labels and milestones to create
    /// - `reporter`: Receives per-entity log and summary lines
    ///
    /// # Returns
    /// One outcome per attempted entity; the last one is a failure if the
    /// run halted early
    pub async fn reconcile<R: Reporter + ?Sized>(
        &self,
        state: &DesiredState,
        reporter: &mut R,
    ) -> ReconcileResult {
        let mut result = ReconcileResult::new();

        open_section(reporter, EntityKind::Label);
        for label in &state.labels {
            let outcome = self
                .attempt(EntityKind::Label, &label.name, self.service.create_label(label))
                .await;
            if !record(&mut result, reporter, EntityKind::Label, &label.name, outcome) {
                reporter.end_group();
                return result;
            }
        }
        reporter.end_group();

        open_section(reporter, EntityKind::Milestone);
        for milestone in &state.milestones {
            let outcome = self
                .attempt(
                    EntityKind::Milestone,
                    &milestone.title,
                    self.service.create_milestone(milestone),
                )
                .await;
            if !record(
                &mut result,
                reporter,
                EntityKind::Milestone,
                &milestone.title,
                outcome,
            ) {
                reporter.end_group();
                return result;
            }
        }
        reporter.end_group();

        result
    }

    async fn attempt<F>(&self, kind: EntityKind, key: &str, create: F) -> Outcome
    where
        F: Future<Output = std::result::Result<CreatedEntity, CreateError>>,
    {
        let response = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, create).await {
                Ok(response) => response,
                Err(_) => Err(CreateError::Other(Error::Timeout {
                    operation: format!("create {kind} {key}"),
                    timeout: limit,
                })),
            },
            None => create.await,
        };

        match response {
            Ok(created) => {
                debug!(
                    %kind,
                    key,
                    id = created.id,
                    url = created.url.as_deref().unwrap_or(""),
                    "Created entity"
                );
                Outcome::Created
            }
            Err(CreateError::AlreadyExists) => Outcome::Skipped {
                reason: SkipReason::AlreadyExists,
            },
            Err(CreateError::Other(e)) => {
                warn!(%kind, key, error = %e, "Create call failed");
                Outcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

fn open_section<R: Reporter + ?Sized>(reporter: &mut R, kind: EntityKind) {
    reporter.group(kind.section_title());
    reporter.summary(&format!("# {}", kind.section_title()));
}

/// Report and store an outcome; returns false if reconciliation must stop
fn record<R: Reporter + ?Sized>(
    result: &mut ReconcileResult,
    reporter: &mut R,
    kind: EntityKind,
    key: &str,
    outcome: Outcome,
) -> bool {
    let summary = format!("{key} {}", outcome.summary_word());
    match &outcome {
        Outcome::Created => {
            reporter.summary(&summary);
            reporter.info(&format!("{kind} {key} created."));
        }
        Outcome::Skipped { .. } => {
            reporter.info(&format!("{kind} {key} already exists, skipping."));
            reporter.summary(&summary);
        }
        Outcome::Failed { .. } => reporter.summary(&summary),
    }

    let keep_going = !matches!(outcome, Outcome::Failed { .. });
    result.add_outcome(EntityOutcome {
        kind,
        key: key.to_string(),
        outcome,
    });
    keep_going
}
