//! Source control for the update workflow.
//!
//! The [`SourceControl`] trait is the seam the updater is written against;
//! [`GitCli`] is the production implementation.

mod git_cli;
mod operations;

pub use git_cli::GitCli;
pub use operations::{RebaseOutcome, Revision, SourceControl};
