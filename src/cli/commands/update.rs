//! Update command implementation.
//!
//! Resolves configuration, opens the checkout and wires the production
//! collaborators into an [`Updater`].

use crate::build::CommandBuildSystem;
use crate::cli::{OutputManager, UpdateArgs};
use crate::config::{LoadedConfig, UpdaterConfig};
use crate::error::Result;
use crate::git::GitCli;
use crate::service::{DetachedRestart, RestartPlan};
use crate::updater::{RestartStatus, UpdateOutcome, Updater};
use std::path::PathBuf;

/// Execute update command
pub(super) async fn execute_update(args: &UpdateArgs, output: &OutputManager) -> Result<()> {
    let repo_hint = args.repo.clone().unwrap_or_else(|| PathBuf::from("."));
    let LoadedConfig { mut config, source } =
        UpdaterConfig::load(args.config.as_deref(), &repo_hint)?;
    apply_overrides(&mut config, args);
    config.validate()?;

    match &source {
        Some(path) => log::info!("configuration from {}", path.display()),
        None => log::info!("no config file found, using defaults"),
    }

    let git = GitCli::open(
        &config.repository.path,
        config.repository.remote.clone(),
        config.repository.branch.clone(),
    )
    .await?;
    output.section(&format!("Updating {}", git.work_dir().display()));

    let build = CommandBuildSystem::from_config(&config, git.work_dir())?;
    let scheduler = DetachedRestart::for_current_exe(&config.service)?;
    let restart_log = scheduler.log_file().to_path_buf();
    let plan = RestartPlan::from_config(&config.service);

    let updater = Updater::new(git, build, scheduler, plan);
    let updater = if args.no_restart {
        updater.without_restart()
    } else {
        updater
    };

    let outcome = updater.run(output).await?;
    if let UpdateOutcome::Updated {
        restart: RestartStatus::Scheduled(_),
        ..
    } = outcome
    {
        output.indent(&format!("Restart log: {}", restart_log.display()));
    }
    Ok(())
}

/// Command line flags (and `PORT`) win over the config file
fn apply_overrides(config: &mut UpdaterConfig, args: &UpdateArgs) {
    if let Some(repo) = &args.repo {
        config.repository.path = repo.clone();
    }
    if let Some(remote) = &args.remote {
        config.repository.remote = remote.clone();
    }
    if let Some(branch) = &args.branch {
        config.repository.branch = branch.clone();
    }
    if let Some(port) = args.port {
        config.service.port = port;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let mut config = UpdaterConfig::default();
        let args = UpdateArgs {
            repo: Some(PathBuf::from("/srv/app")),
            branch: Some("production".to_string()),
            port: Some(4100),
            ..UpdateArgs::default()
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.repository.path, PathBuf::from("/srv/app"));
        assert_eq!(config.repository.branch, "production");
        assert_eq!(config.repository.remote, "origin");
        assert_eq!(config.service.port, 4100);
    }
}
