//! Source control trait and types for the update workflow.
//!
//! The updater only needs a handful of operations on the live checkout:
//! read the current revision, fetch, rebase onto the remote, abort a
//! rebase, and hard-reset for rollback. [`GitCli`](super::GitCli) provides
//! them by driving the `git` binary; tests substitute in-memory fakes.

use crate::error::Result;
use std::fmt;
use std::future::Future;

/// Trait defining the source control operations the updater relies on
pub trait SourceControl {
    /// Human-readable name of the remote reference being tracked (e.g. `origin/main`)
    fn remote_ref(&self) -> String;

    /// Identifier of the revision currently checked out
    fn current_revision(&self) -> impl Future<Output = Result<Revision>> + Send;

    /// Fetch the remote reference without touching the work tree
    fn fetch(&self) -> impl Future<Output = Result<()>> + Send;

    /// Replay local state onto the fetched remote reference
    fn rebase_onto_remote(&self) -> impl Future<Output = Result<RebaseOutcome>> + Send;

    /// Abandon an in-progress rebase, restoring the pre-rebase state
    fn abort_rebase(&self) -> impl Future<Output = Result<()>> + Send;

    /// Discard all changes and move the tree to `revision`
    fn reset_hard(&self, revision: &Revision) -> impl Future<Output = Result<()>> + Send;
}

/// Result of replaying local state onto the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseOutcome {
    /// The rebase completed (possibly as a no-op)
    Applied,
    /// The rebase stopped on conflicts and is still in progress
    Conflict,
}

/// Identifier of a source tree state (a full commit id)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    /// Wrap an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Full identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated identifier for display
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }

    /// Whether `output` looks like a full SHA-1 or SHA-256 object id
    pub fn is_object_id(output: &str) -> bool {
        matches!(output.len(), 40 | 64) && output.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
