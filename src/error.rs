//! Error types for service_updater operations.
//!
//! Errors are grouped by the collaborator that produced them. The top-level
//! [`UpdateError`] also carries the two failures the updater compensates for
//! itself: a rebase conflict and a build failure followed by a rollback.

use crate::git::Revision;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for service_updater operations
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Main error type for all service_updater operations
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Rebasing onto the remote hit conflicts; the rebase was aborted
    #[error(
        "Rebase onto {remote_ref} hit conflicts. Rebase aborted, source tree left at {revision}"
    )]
    SyncConflict {
        /// Remote reference that was being synced to
        remote_ref: String,
        /// Revision the tree was left at (unchanged)
        revision: Revision,
    },

    /// Rebase hit conflicts and aborting it failed too
    #[error(
        "Rebase onto {remote_ref} hit conflicts and aborting it also failed: {reason}. \
         The work tree may be mid-rebase (started from {revision})"
    )]
    AbortFailed {
        /// Remote reference that was being synced to
        remote_ref: String,
        /// Revision the rebase started from
        revision: Revision,
        /// Why the abort failed
        reason: String,
    },

    /// Build failed and the source tree was reset to the prior revision
    #[error("Build of {attempted} failed, source tree rolled back to {prior}: {source}")]
    BuildFailed {
        /// Revision the tree was restored to
        prior: Revision,
        /// Revision whose build failed
        attempted: Revision,
        /// Underlying build failure
        #[source]
        source: Box<UpdateError>,
    },

    /// Build failed and the rollback itself failed too
    #[error(
        "Build of {attempted} failed ({build}) and rollback to {prior} also failed: {reason}"
    )]
    RollbackFailed {
        /// Revision the rollback was aiming for
        prior: Revision,
        /// Revision whose build failed
        attempted: Revision,
        /// Underlying build failure
        build: Box<UpdateError>,
        /// Why the reset failed
        reason: String,
    },

    /// Version control errors
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// Build tool errors
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Service manager errors
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// CLI and process execution errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),
}

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    /// Not a git repository
    #[error("{path} is not inside a git work tree")]
    NotRepository {
        /// Directory that was checked
        path: PathBuf,
    },

    /// A git invocation exited unsuccessfully
    #[error("git {operation} failed: {reason}")]
    CommandFailed {
        /// Operation that failed (fetch, rebase, reset, ...)
        operation: String,
        /// Trimmed stderr of the git process
        reason: String,
    },

    /// `git rev-parse` produced something that is not an object id
    #[error("Unexpected revision output from git: '{output}'")]
    InvalidRevision {
        /// Raw output
        output: String,
    },
}

/// Build tool errors
#[derive(Error, Debug)]
pub enum BuildError {
    /// Dependency fetch failed
    #[error("Dependency fetch failed: {reason}")]
    DependencyFetch {
        /// Reason for the error
        reason: String,
    },

    /// Compilation failed
    #[error("Compilation failed: {reason}")]
    Compile {
        /// Reason for the error
        reason: String,
    },

    /// Database migration failed
    #[error("Migration failed: {reason}")]
    Migrate {
        /// Reason for the error
        reason: String,
    },

    /// Recording the new revision as updating failed
    #[error("Failed to mark revision {revision} as updating: {reason}")]
    MarkUpdating {
        /// Revision that was being recorded
        revision: Revision,
        /// Reason for the error
        reason: String,
    },

    /// Lock file could not be fingerprinted
    #[error("Failed to read lock file {path}: {source}")]
    LockDigest {
        /// Lock file path
        path: PathBuf,
        /// IO error
        #[source]
        source: std::io::Error,
    },
}

/// Service manager errors
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Stopping the service failed
    #[error("Failed to stop service '{service}': {reason}")]
    Stop {
        /// Service name
        service: String,
        /// Reason for the error
        reason: String,
    },

    /// Starting the service failed
    #[error("Failed to start service '{service}': {reason}")]
    Start {
        /// Service name
        service: String,
        /// Reason for the error
        reason: String,
    },

    /// The detached restart could not be launched
    #[error("Failed to launch restart of '{service}': {reason}")]
    Launch {
        /// Service name
        service: String,
        /// Reason for the error
        reason: String,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Config file path
        path: PathBuf,
        /// IO error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the expected schema
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// Config file path
        path: PathBuf,
        /// TOML error
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range or malformed
    #[error("Invalid value for '{field}': {reason}")]
    Invalid {
        /// Dotted field name
        field: String,
        /// Reason for the error
        reason: String,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Program not found on PATH
    #[error("Program '{program}' not found on PATH")]
    ProgramNotFound {
        /// Program name
        program: String,
    },

    /// Command could not be spawned or awaited
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl UpdateError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            UpdateError::SyncConflict { remote_ref, .. } => vec![
                format!("Local commits conflict with {remote_ref}; resolve them by hand"),
                format!("Inspect the divergence: git log --oneline HEAD...{remote_ref}"),
            ],
            UpdateError::AbortFailed { revision, .. } => vec![
                "Check the work tree state: git status".to_string(),
                format!("Abort by hand (git rebase --abort) or reset: git reset --hard {revision}"),
            ],
            UpdateError::BuildFailed { attempted, .. } => vec![
                format!("Fix the build of {} upstream and run the update again", attempted.short()),
                "The running service was not touched".to_string(),
            ],
            UpdateError::RollbackFailed { prior, .. } => vec![
                format!("Restore the tree manually: git reset --hard {prior}"),
                "Do not restart the service until the tree builds".to_string(),
            ],
            UpdateError::Build(BuildError::DependencyFetch { .. }) => vec![
                "The source tree has been advanced but not built".to_string(),
                "Fetch dependencies by hand, then build, migrate and restart".to_string(),
            ],
            UpdateError::Build(BuildError::Migrate { .. }) => vec![
                "The source tree has been advanced and built but not restarted".to_string(),
                "The old build is still serving; check the schema before restarting".to_string(),
            ],
            UpdateError::Build(BuildError::MarkUpdating { revision, .. }) => vec![
                format!("{revision} is built and migrated but was not marked or restarted"),
                "Mark it by hand, then restart the service".to_string(),
            ],
            UpdateError::Service(ServiceError::Stop { service, .. }) => vec![
                format!("The service may still be running: systemctl status {service}"),
                "Check that sudo allows systemctl without a password".to_string(),
            ],
            UpdateError::Service(ServiceError::Start { service, .. }) => vec![
                format!("The service is stopped; start it: sudo systemctl start {service}"),
                format!("Inspect why it failed: journalctl -u {service}"),
            ],
            UpdateError::Service(ServiceError::Launch { service, .. }) => vec![
                "The update was applied but the restart was never launched".to_string(),
                format!("Restart manually: sudo systemctl restart {service}"),
            ],
            UpdateError::Git(GitError::NotRepository { .. }) => vec![
                "Run from the root of the service checkout".to_string(),
                "Or point at it with --repo <path>".to_string(),
            ],
            UpdateError::Cli(CliError::InvalidArguments { .. }) => {
                vec!["Run with --help to see the accepted flags".to_string()]
            }
            UpdateError::Cli(CliError::ProgramNotFound { program }) => vec![
                format!("Install '{program}' or adjust PATH"),
                "Override the command line in the [commands] config section".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            UpdateError::Config(_) | UpdateError::Cli(CliError::InvalidArguments { .. }) => 2,
            _ => 1,
        }
    }

    /// Whether an update left the source tree somewhere other than the
    /// revision the running service was built from
    pub fn leaves_tree_advanced(&self) -> bool {
        matches!(
            self,
            UpdateError::Build(
                BuildError::DependencyFetch { .. }
                    | BuildError::Migrate { .. }
                    | BuildError::MarkUpdating { .. }
            ) | UpdateError::RollbackFailed { .. }
                | UpdateError::AbortFailed { .. }
                | UpdateError::Service(ServiceError::Launch { .. })
        )
    }
}
