//! Result of a successful update run.

use crate::git::Revision;
use crate::service::RestartPlan;

/// What happened to the restart step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartStatus {
    /// Restart launched with this plan; its outcome is not observed
    Scheduled(RestartPlan),
    /// Restart disabled for this run
    Skipped,
}

/// Successful outcome of [`Updater::run`](super::Updater::run)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Remote had nothing new
    UpToDate {
        /// Revision checked out before and after
        revision: Revision,
    },
    /// Tree advanced, built, migrated and marked
    Updated {
        /// Revision before the update
        prior: Revision,
        /// Revision after the update
        target: Revision,
        /// Whether the lock file changed and dependencies were fetched
        dependencies_fetched: bool,
        /// Restart step status
        restart: RestartStatus,
    },
}

impl UpdateOutcome {
    /// One-line summary; `"<prior> -> <target>"` for an update
    pub fn summary(&self) -> String {
        match self {
            UpdateOutcome::UpToDate { revision } => format!("Already up to date at {}", revision),
            UpdateOutcome::Updated { prior, target, .. } => format!("{} -> {}", prior, target),
        }
    }

    /// Revision checked out after the run
    pub fn current_revision(&self) -> &Revision {
        match self {
            UpdateOutcome::UpToDate { revision } => revision,
            UpdateOutcome::Updated { target, .. } => target,
        }
    }
}
