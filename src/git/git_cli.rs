//! `SourceControl` implementation backed by the `git` command line.

use crate::error::{GitError, Result};
use crate::git::{RebaseOutcome, Revision, SourceControl};
use crate::process::{self, CommandOutput, CommandSpec};
use std::path::{Path, PathBuf};

/// Git operations run against a work tree with the `git` binary
#[derive(Debug, Clone)]
pub struct GitCli {
    work_dir: PathBuf,
    remote: String,
    branch: String,
}

impl GitCli {
    /// Open the work tree containing `path`, tracking `remote/branch`
    pub async fn open<P: AsRef<Path>>(
        path: P,
        remote: impl Into<String>,
        branch: impl Into<String>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let probe = Self {
            work_dir: path.to_path_buf(),
            remote: remote.into(),
            branch: branch.into(),
        };

        let output = probe.git(["rev-parse", "--show-toplevel"]).await?;
        if !output.success() {
            return Err(GitError::NotRepository {
                path: path.to_path_buf(),
            }
            .into());
        }

        let toplevel = PathBuf::from(output.stdout.trim());
        log::debug!("git work tree: {}", toplevel.display());

        Ok(Self {
            work_dir: toplevel,
            ..probe
        })
    }

    /// Root of the work tree
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    async fn git<I, S>(&self, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        // Never block on a credential prompt; the updater runs unattended.
        let spec = CommandSpec::new("git", args).env("GIT_TERMINAL_PROMPT", "0");
        Ok(process::run_captured(&spec, &self.work_dir).await?)
    }

    async fn git_checked<I, S>(&self, operation: &str, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let output = self.git(args).await?;
        if !output.success() {
            return Err(GitError::CommandFailed {
                operation: operation.to_string(),
                reason: output.failure_reason(),
            }
            .into());
        }
        Ok(output.stdout)
    }

    /// Classify a failed `git rebase` given whether a stopped rebase was found.
    ///
    /// A stopped rebase is a conflict for the caller to abort; anything else
    /// (dirty tree, unknown upstream) left the tree untouched and is a plain
    /// failure. When the rebase state cannot be read the rebase is aborted
    /// here, so the tree is never left mid-rebase.
    async fn settle_failed_rebase(
        &self,
        failure: String,
        in_progress: Result<bool>,
    ) -> Result<RebaseOutcome> {
        match in_progress {
            Ok(true) => {
                log::warn!("rebase onto {} stopped: {}", self.remote_ref(), failure);
                Ok(RebaseOutcome::Conflict)
            }
            Ok(false) => Err(GitError::CommandFailed {
                operation: "rebase".to_string(),
                reason: failure,
            }
            .into()),
            Err(state_err) => {
                let abort = match self.abort_rebase().await {
                    Ok(()) => "aborted".to_string(),
                    Err(e) => format!("abort: {}", e),
                };
                Err(GitError::CommandFailed {
                    operation: "rebase".to_string(),
                    reason: format!(
                        "{}; rebase state unreadable ({}); {}",
                        failure, state_err, abort
                    ),
                }
                .into())
            }
        }
    }

    /// Whether git has a rebase stopped mid-way in this repository
    async fn rebase_in_progress(&self) -> Result<bool> {
        for state_dir in ["rebase-merge", "rebase-apply"] {
            let raw = self
                .git_checked("rev-parse", ["rev-parse", "--git-path", state_dir])
                .await?;
            let path = PathBuf::from(raw.trim());
            let path = if path.is_absolute() {
                path
            } else {
                self.work_dir.join(path)
            };
            if path.exists() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl SourceControl for GitCli {
    fn remote_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    async fn current_revision(&self) -> Result<Revision> {
        let stdout = self
            .git_checked("rev-parse", ["rev-parse", "--verify", "HEAD"])
            .await?;
        let id = stdout.trim();
        if !Revision::is_object_id(id) {
            return Err(GitError::InvalidRevision {
                output: id.to_string(),
            }
            .into());
        }
        Ok(Revision::new(id))
    }

    async fn fetch(&self) -> Result<()> {
        self.git_checked(
            "fetch",
            ["fetch", "--quiet", self.remote.as_str(), self.branch.as_str()],
        )
        .await?;
        Ok(())
    }

    async fn rebase_onto_remote(&self) -> Result<RebaseOutcome> {
        let upstream = self.remote_ref();
        let output = self.git(["rebase", upstream.as_str()]).await?;
        if output.success() {
            return Ok(RebaseOutcome::Applied);
        }

        self.settle_failed_rebase(output.failure_reason(), self.rebase_in_progress().await)
            .await
    }

    async fn abort_rebase(&self) -> Result<()> {
        self.git_checked("rebase --abort", ["rebase", "--abort"])
            .await?;
        Ok(())
    }

    async fn reset_hard(&self, revision: &Revision) -> Result<()> {
        self.git_checked("reset --hard", ["reset", "--hard", "--quiet", revision.as_str()])
            .await?;
        Ok(())
    }
}
