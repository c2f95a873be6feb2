//! Command line argument parsing and validation.
//!
//! Running with no arguments performs an update of the checkout in the
//! current directory. The `restart` subcommand is internal: it is what the
//! detached restart process runs.

use crate::config::MAX_PORT_POLL_ATTEMPTS;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Self-update a running service from its git checkout
#[derive(Parser, Debug)]
#[command(
    name = "service_updater",
    version,
    about = "Pull, rebuild, migrate and restart a service, rolling back on build failure",
    long_about = "Update the service checkout in the current directory.

Fetches the tracked remote branch and rebases onto it, fetches dependencies
when the lock file changed, builds, migrates, marks the new revision as
updating, and schedules a restart of the service. A failed build resets the
checkout to the revision it started at.

Usage:
  service_updater
  service_updater --repo /srv/app --branch production
  PORT=4100 service_updater --config /etc/service_updater.toml",
    args_conflicts_with_subcommands = true
)]
pub struct Args {
    /// Subcommand (defaults to `update`)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Update options when no subcommand is given
    #[command(flatten)]
    pub update: UpdateArgs,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Update the checkout and restart the service (default)
    Update(UpdateArgs),

    /// Run the delayed stop / wait-for-port / start sequence
    #[command(hide = true)]
    Restart(RestartArgs),
}

/// Options for the update command
#[derive(clap::Args, Debug, Clone, Default)]
pub struct UpdateArgs {
    /// Config file (default: ./service_updater.toml, then the user config dir)
    #[arg(long, value_name = "PATH", env = "SERVICE_UPDATER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the service checkout
    #[arg(long, value_name = "PATH")]
    pub repo: Option<PathBuf>,

    /// Remote to fetch from
    #[arg(long, value_name = "NAME")]
    pub remote: Option<String>,

    /// Remote branch to rebase onto
    #[arg(long, value_name = "NAME")]
    pub branch: Option<String>,

    /// Port the service listens on
    #[arg(long, value_name = "PORT", env = "PORT")]
    pub port: Option<u16>,

    /// Update without restarting the service
    #[arg(long)]
    pub no_restart: bool,

    /// Only print errors
    #[arg(long, short)]
    pub quiet: bool,
}

/// Options for the internal restart command
#[derive(clap::Args, Debug, Clone)]
pub struct RestartArgs {
    /// systemd unit to restart
    #[arg(long, value_name = "NAME")]
    pub service: String,

    /// Port to wait on
    #[arg(long, value_name = "PORT")]
    pub port: u16,

    /// Delay before stopping, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 2000)]
    pub delay_ms: u64,

    /// Maximum number of port release checks
    #[arg(long, value_name = "N", default_value_t = 30)]
    pub poll_attempts: u32,

    /// Interval between port checks, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 500)]
    pub poll_interval_ms: u64,

    /// Call systemctl directly instead of through sudo
    #[arg(long)]
    pub no_sudo: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The command to run, with `update` as the default
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Update(self.update))
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Some(Command::Restart(restart)) => restart.validate(),
            Some(Command::Update(update)) => update.validate(),
            None => self.update.validate(),
        }
    }
}

impl UpdateArgs {
    fn validate(&self) -> Result<(), String> {
        if self.port == Some(0) {
            return Err("--port must be non-zero".to_string());
        }
        if matches!(&self.remote, Some(remote) if remote.trim().is_empty()) {
            return Err("--remote must not be empty".to_string());
        }
        if matches!(&self.branch, Some(branch) if branch.trim().is_empty()) {
            return Err("--branch must not be empty".to_string());
        }
        Ok(())
    }
}

impl RestartArgs {
    fn validate(&self) -> Result<(), String> {
        if self.service.trim().is_empty() {
            return Err("--service must not be empty".to_string());
        }
        if self.port == 0 {
            return Err("--port must be non-zero".to_string());
        }
        if !(1..=MAX_PORT_POLL_ATTEMPTS).contains(&self.poll_attempts) {
            return Err(format!(
                "--poll-attempts must be between 1 and {}",
                MAX_PORT_POLL_ATTEMPTS
            ));
        }
        Ok(())
    }
}
