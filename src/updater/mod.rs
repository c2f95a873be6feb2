//! The update procedure.
//!
//! [`Updater::run`] is a straight-line state machine over three injected
//! collaborators:
//!
//! 1. capture the prior revision and lock digest
//! 2. fetch and rebase onto the remote (conflict: abort and fail; no change: done)
//! 3. fetch dependencies if the lock digest changed
//! 4. compile (failure: hard reset to the prior revision and fail)
//! 5. migrate (failure: fail, no rollback)
//! 6. mark the new revision as updating
//! 7. schedule the restart without waiting for it
//!
//! Only the rebase conflict and the build failure have compensating actions.
//! Every other failure stops the run where it happened.

mod outcome;

pub use outcome::{RestartStatus, UpdateOutcome};

use crate::build::BuildSystem;
use crate::cli::OutputManager;
use crate::error::{Result, UpdateError};
use crate::git::{RebaseOutcome, Revision, SourceControl};
use crate::service::{RestartPlan, RestartScheduler};

/// Drives one update of the service checkout
#[derive(Debug)]
pub struct Updater<S, B, R> {
    source: S,
    build: B,
    scheduler: R,
    restart_plan: Option<RestartPlan>,
}

impl<S, B, R> Updater<S, B, R>
where
    S: SourceControl,
    B: BuildSystem,
    R: RestartScheduler,
{
    /// Create an updater that restarts with `restart_plan` after a successful update
    pub fn new(source: S, build: B, scheduler: R, restart_plan: RestartPlan) -> Self {
        Self {
            source,
            build,
            scheduler,
            restart_plan: Some(restart_plan),
        }
    }

    /// Skip the restart step
    pub fn without_restart(mut self) -> Self {
        self.restart_plan = None;
        self
    }

    /// Run the full update procedure
    pub async fn run(&self, output: &OutputManager) -> Result<UpdateOutcome> {
        let remote_ref = self.source.remote_ref();

        let prior = self.source.current_revision().await?;
        let lock_before = self.build.lock_digest().await?;
        log::info!("prior revision {}, lock digest {}", prior, lock_before);
        output.info(&format!("Current revision: {}", prior.short()));

        output.progress(&format!("Fetching {}...", remote_ref));
        self.source.fetch().await?;

        output.progress(&format!("Rebasing onto {}...", remote_ref));
        if self.source.rebase_onto_remote().await? == RebaseOutcome::Conflict {
            output.warn("Rebase hit conflicts, aborting");
            if let Err(abort_err) = self.source.abort_rebase().await {
                log::error!("aborting rebase onto {} failed: {}", remote_ref, abort_err);
                return Err(UpdateError::AbortFailed {
                    remote_ref,
                    revision: prior,
                    reason: abort_err.to_string(),
                });
            }
            return Err(UpdateError::SyncConflict {
                remote_ref,
                revision: prior,
            });
        }

        let target = self.source.current_revision().await?;
        if target == prior {
            log::info!("{} already at {}", remote_ref, prior);
            output.success(&format!("Already up to date ({})", prior.short()));
            return Ok(UpdateOutcome::UpToDate { revision: prior });
        }
        output.info(&format!("Advanced to {}", target.short()));

        let lock_after = self.build.lock_digest().await?;
        let dependencies_fetched = if lock_after != lock_before {
            log::info!("lock digest changed: {} -> {}", lock_before, lock_after);
            output.progress("Lock file changed, fetching dependencies...");
            self.build.fetch_dependencies().await?;
            true
        } else {
            output.info("Lock file unchanged, skipping dependency fetch");
            false
        };

        output.progress("Building...");
        if let Err(build_err) = self.build.compile().await {
            output.error(&format!("Build failed: {}", build_err));
            output.warn(&format!("Rolling back to {}", prior.short()));
            return Err(self.roll_back(prior, target, build_err).await);
        }
        output.success("Build succeeded");

        output.progress("Running migrations...");
        self.build.migrate().await?;

        self.build.mark_updating(&target).await?;
        log::info!("marked {} as updating", target);

        let restart = match &self.restart_plan {
            Some(plan) => {
                self.scheduler.schedule(plan)?;
                output.info(&format!(
                    "Restart scheduled in {:.1}s (waiting for port {} to free up)",
                    plan.delay.as_secs_f64(),
                    plan.port
                ));
                RestartStatus::Scheduled(plan.clone())
            }
            None => {
                output.warn("Restart skipped; the old build keeps serving until restarted");
                RestartStatus::Skipped
            }
        };

        let outcome = UpdateOutcome::Updated {
            prior,
            target,
            dependencies_fetched,
            restart,
        };
        output.success(&outcome.summary());
        Ok(outcome)
    }

    /// Hard-reset to `prior` after a failed build of `attempted`
    async fn roll_back(&self, prior: Revision, attempted: Revision, cause: UpdateError) -> UpdateError {
        match self.source.reset_hard(&prior).await {
            Ok(()) => {
                log::warn!("build of {} failed, reset to {}", attempted, prior);
                UpdateError::BuildFailed {
                    prior,
                    attempted,
                    source: Box::new(cause),
                }
            }
            Err(reset_err) => {
                log::error!("rollback to {} failed: {}", prior, reset_err);
                UpdateError::RollbackFailed {
                    prior,
                    attempted,
                    build: Box::new(cause),
                    reason: reset_err.to_string(),
                }
            }
        }
    }
}
