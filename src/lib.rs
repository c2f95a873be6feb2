//! # service_updater
//!
//! Self-update for a service that runs out of a git checkout.
//!
//! One run advances the checkout to the tracked remote branch, rebuilds,
//! migrates the database, records the new revision and schedules a restart
//! of the service. A failed build resets the checkout to where it started.
//!
//! ## Features
//!
//! - **Conflict-safe sync**: a conflicting rebase is aborted and nothing changes
//! - **Build rollback**: a failed build hard-resets to the prior revision
//! - **Lock-aware dependency fetch**: dependencies are fetched only when the lock file changed
//! - **Detached restart**: stop, wait for the port, start, without blocking the caller
//! - **Injectable collaborators**: `SourceControl`, `BuildSystem`, `ServiceManager`
//!
//! ## Usage
//!
//! ```bash
//! service_updater                       # update the checkout in the current directory
//! service_updater --branch production   # track a different branch
//! PORT=4100 service_updater --no-restart
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod process;
pub mod service;
pub mod updater;

pub use build::{BuildSystem, CommandBuildSystem, LockDigest};
pub use cli::Args;
pub use config::UpdaterConfig;
pub use error::{Result, UpdateError};
pub use git::{GitCli, RebaseOutcome, Revision, SourceControl};
pub use service::{
    DetachedRestart, InProcessRestart, RestartPlan, RestartScheduler, ServiceManager,
    SystemdServiceManager,
};
pub use updater::{RestartStatus, UpdateOutcome, Updater};
