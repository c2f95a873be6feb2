//! Build tool integration.
//!
//! The updater treats the build tool as opaque: it fetches dependencies,
//! compiles, migrates, and runs one administrative command that records the
//! new revision. [`CommandBuildSystem`] runs configured command lines for
//! each of those steps.

mod command_build;
mod lock_digest;

pub use command_build::CommandBuildSystem;
pub use lock_digest::LockDigest;

use crate::error::Result;
use crate::git::Revision;
use std::future::Future;

/// Trait defining the build tool operations the updater relies on
pub trait BuildSystem {
    /// Fingerprint of the dependency lock artifact
    fn lock_digest(&self) -> impl Future<Output = Result<LockDigest>> + Send;

    /// Fetch dependencies
    fn fetch_dependencies(&self) -> impl Future<Output = Result<()>> + Send;

    /// Compile the source tree
    fn compile(&self) -> impl Future<Output = Result<()>> + Send;

    /// Apply pending schema migrations against the live database
    fn migrate(&self) -> impl Future<Output = Result<()>> + Send;

    /// Record `revision` in persistent service state as just updated
    fn mark_updating(&self, revision: &Revision) -> impl Future<Output = Result<()>> + Send;
}
