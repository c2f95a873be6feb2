//! `BuildSystem` implementation that runs configured command lines.

use crate::build::{BuildSystem, LockDigest};
use crate::config::{BuildCommands, REVISION_PLACEHOLDER, UpdaterConfig};
use crate::error::{BuildError, Result};
use crate::git::Revision;
use crate::process::{self, CommandSpec};
use std::path::{Path, PathBuf};

/// Build steps driven by external commands run in the work tree
#[derive(Debug, Clone)]
pub struct CommandBuildSystem {
    work_dir: PathBuf,
    lock_file: PathBuf,
    commands: BuildCommands,
}

impl CommandBuildSystem {
    /// Create from explicit command specs
    pub fn new(work_dir: impl Into<PathBuf>, lock_file: impl AsRef<Path>, commands: BuildCommands) -> Self {
        let work_dir = work_dir.into();
        let lock_file = work_dir.join(lock_file);
        Self {
            work_dir,
            lock_file,
            commands,
        }
    }

    /// Create from the loaded configuration
    pub fn from_config(config: &UpdaterConfig, work_dir: impl Into<PathBuf>) -> Result<Self> {
        let commands = config.command_specs()?;
        Ok(Self::new(work_dir, &config.repository.lock_file, commands))
    }

    /// Run `spec` with output passed through, returning a failure reason on non-zero exit
    async fn run_step(&self, spec: &CommandSpec) -> Result<Option<String>> {
        let status = process::run_inherited(spec, &self.work_dir).await?;
        if status.success() {
            Ok(None)
        } else {
            Ok(Some(format!("`{}` exited with {}", spec, status)))
        }
    }
}

impl BuildSystem for CommandBuildSystem {
    async fn lock_digest(&self) -> Result<LockDigest> {
        Ok(LockDigest::of_file(&self.lock_file).await?)
    }

    async fn fetch_dependencies(&self) -> Result<()> {
        match self.run_step(&self.commands.dependencies).await? {
            None => Ok(()),
            Some(reason) => Err(BuildError::DependencyFetch { reason }.into()),
        }
    }

    async fn compile(&self) -> Result<()> {
        match self.run_step(&self.commands.build).await? {
            None => Ok(()),
            Some(reason) => Err(BuildError::Compile { reason }.into()),
        }
    }

    async fn migrate(&self) -> Result<()> {
        match self.run_step(&self.commands.migrate).await? {
            None => Ok(()),
            Some(reason) => Err(BuildError::Migrate { reason }.into()),
        }
    }

    async fn mark_updating(&self, revision: &Revision) -> Result<()> {
        let spec = self
            .commands
            .mark_updating
            .substitute(REVISION_PLACEHOLDER, revision.as_str());
        match self.run_step(&spec).await? {
            None => Ok(()),
            Some(reason) => Err(BuildError::MarkUpdating {
                revision: revision.clone(),
                reason,
            }
            .into()),
        }
    }
}
